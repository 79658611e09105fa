//! DynamoDB item store implementation.

use async_stream::try_stream;
use async_trait::async_trait;
use aws_sdk_dynamodb::types::{ReturnValue, ReturnValuesOnConditionCheckFailure};
use aws_sdk_dynamodb::Client;
use futures_util::stream::BoxStream;
use tracing::debug;

use dynabridge_core::{Condition, Item, ItemKey, ItemStore, StoreResult, UpdateSpec};

use crate::config::Config;

use super::conversions::{attributes_to_item, item_to_attributes, key_to_attributes};
use super::error::{
    map_delete_item_error, map_get_item_error, map_put_item_error, map_scan_error,
    map_update_item_error,
};
use super::expression::ExpressionBuilder;

/// Creates a DynamoDB client for the configured region and endpoint.
pub async fn create_client(config: &Config) -> Client {
    let mut sdk_config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new(config.region.clone()));

    if let Some(endpoint) = &config.endpoint_url {
        sdk_config_loader = sdk_config_loader.endpoint_url(endpoint);
    }

    let sdk_config = sdk_config_loader.load().await;
    Client::new(&sdk_config)
}

/// DynamoDB-based item store.
///
/// Reads are strongly consistent so that version checks see the latest write.
#[derive(Clone)]
pub struct DynamoDbStore {
    client: Client,
}

impl std::fmt::Debug for DynamoDbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamoDbStore").finish_non_exhaustive()
    }
}

impl DynamoDbStore {
    /// Creates a new store with the given DynamoDB client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Creates a new store from configuration, using the AWS SDK default
    /// credential chain.
    pub async fn from_config(config: &Config) -> Self {
        Self::new(create_client(config).await)
    }
}

/// Renders an optional condition, returning the expression and its bindings.
fn render_condition(
    builder: &mut ExpressionBuilder,
    condition: Option<&Condition>,
) -> Option<String> {
    condition.map(|c| builder.condition(c))
}

#[async_trait]
impl ItemStore for DynamoDbStore {
    async fn put_item(
        &self,
        table: &str,
        key: &ItemKey,
        item: Item,
        condition: Option<Condition>,
    ) -> StoreResult<()> {
        let mut item = item;
        item.extend(key.to_item());

        let mut builder = ExpressionBuilder::new();
        let condition_expression = render_condition(&mut builder, condition.as_ref());
        let (names, values) = builder.into_parts();
        debug!(table, %key, condition = ?condition_expression, "PutItem");

        self.client
            .put_item()
            .table_name(table)
            .set_item(Some(item_to_attributes(&item)))
            .set_condition_expression(condition_expression)
            .set_expression_attribute_names(names)
            .set_expression_attribute_values(values)
            .return_values_on_condition_check_failure(ReturnValuesOnConditionCheckFailure::AllOld)
            .send()
            .await
            .map_err(|e| map_put_item_error(e, table))?;

        Ok(())
    }

    async fn get_item(&self, table: &str, key: &ItemKey) -> StoreResult<Option<Item>> {
        debug!(table, %key, "GetItem");

        let result = self
            .client
            .get_item()
            .table_name(table)
            .set_key(Some(key_to_attributes(key)))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| map_get_item_error(e, table))?;

        match result.item {
            Some(item) => Ok(Some(attributes_to_item(&item)?)),
            None => Ok(None),
        }
    }

    async fn update_item(
        &self,
        table: &str,
        key: &ItemKey,
        update: UpdateSpec,
        condition: Option<Condition>,
    ) -> StoreResult<Item> {
        let mut builder = ExpressionBuilder::new();
        let update_expression = builder.update(key, &update);
        let condition_expression = render_condition(&mut builder, condition.as_ref());
        let (names, values) = builder.into_parts();
        debug!(
            table,
            %key,
            update = ?update_expression,
            condition = ?condition_expression,
            "UpdateItem"
        );

        let result = self
            .client
            .update_item()
            .table_name(table)
            .set_key(Some(key_to_attributes(key)))
            .set_update_expression(update_expression)
            .set_condition_expression(condition_expression)
            .set_expression_attribute_names(names)
            .set_expression_attribute_values(values)
            .return_values(ReturnValue::AllNew)
            .return_values_on_condition_check_failure(ReturnValuesOnConditionCheckFailure::AllOld)
            .send()
            .await
            .map_err(|e| map_update_item_error(e, table))?;

        match result.attributes {
            Some(attributes) => attributes_to_item(&attributes),
            None => Ok(key.to_item()),
        }
    }

    async fn delete_item(
        &self,
        table: &str,
        key: &ItemKey,
        condition: Option<Condition>,
    ) -> StoreResult<()> {
        let mut builder = ExpressionBuilder::new();
        let condition_expression = render_condition(&mut builder, condition.as_ref());
        let (names, values) = builder.into_parts();
        debug!(table, %key, condition = ?condition_expression, "DeleteItem");

        self.client
            .delete_item()
            .table_name(table)
            .set_key(Some(key_to_attributes(key)))
            .set_condition_expression(condition_expression)
            .set_expression_attribute_names(names)
            .set_expression_attribute_values(values)
            .return_values_on_condition_check_failure(ReturnValuesOnConditionCheckFailure::AllOld)
            .send()
            .await
            .map_err(|e| map_delete_item_error(e, table))?;

        Ok(())
    }

    fn scan<'a>(
        &'a self,
        table: &'a str,
        filter: Option<Condition>,
    ) -> BoxStream<'a, StoreResult<Item>> {
        Box::pin(try_stream! {
            let mut exclusive_start_key = None;
            loop {
                let mut builder = ExpressionBuilder::new();
                let filter_expression = render_condition(&mut builder, filter.as_ref());
                let (names, values) = builder.into_parts();
                debug!(table, filter = ?filter_expression, "Scan");

                let page = self
                    .client
                    .scan()
                    .table_name(table)
                    .set_filter_expression(filter_expression)
                    .set_expression_attribute_names(names)
                    .set_expression_attribute_values(values)
                    .set_exclusive_start_key(exclusive_start_key.take())
                    .consistent_read(true)
                    .send()
                    .await
                    .map_err(|e| map_scan_error(e, table))?;

                for attributes in page.items() {
                    yield attributes_to_item(attributes)?;
                }

                match page.last_evaluated_key {
                    Some(key) if !key.is_empty() => exclusive_start_key = Some(key),
                    _ => break,
                }
            }
        })
    }
}
