//! DynamoDB storage backend implementation.
//!
//! This module provides a DynamoDB-based implementation of `ItemStore`
//! using `aws-sdk-dynamodb`. Every conditional write asks for the stored item
//! on failure (`ReturnValuesOnConditionCheckFailure::AllOld`) so callers can
//! classify the failure without a second read.

mod conversions;
mod error;
mod expression;
mod store;

pub use store::{create_client, DynamoDbStore};
