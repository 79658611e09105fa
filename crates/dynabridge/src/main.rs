use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dynabridge::{
    item, AttributeDefinition, AttributeType, Condition, Config, DynaError, ItemKey, ItemStore,
    Lock, Record, Recovery, RetryPolicy, Schema, TableBinding, Value,
};

/// Gives up on a contended counter after this many attempts.
const MAX_ATTEMPTS: u32 = 100;

const COUNTER_LOCK: &str = "counterLock";

/// DynaBridge - schema-validated, optimistically locked DynamoDB access
#[derive(Parser, Debug)]
#[command(name = "dynabridge")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Store backend to run against
    #[arg(long, value_enum, default_value = "memory", env = "DYNABRIDGE_BACKEND", global = true)]
    backend: Backend,

    #[command(subcommand)]
    command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Backend {
    /// In-process store (data is lost on exit)
    Memory,
    /// AWS DynamoDB, configured through AWS_REGION and AWS_ENDPOINT_URL
    Dynamodb,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Increment a shared counter from concurrent workers and check the total
    Counter(CounterArgs),
    /// Walk through saving, fetching, scanning and conditionally updating users
    Demo(DemoArgs),
}

#[derive(Args, Debug)]
struct CounterArgs {
    /// Number of concurrent workers
    #[arg(long, short, default_value = "10")]
    workers: u64,

    /// Increments performed by each worker
    #[arg(long, short, default_value = "1")]
    increments: u64,

    /// Serialize increments with an item lock instead of optimistic retries
    #[arg(long)]
    use_lock: bool,

    /// Lease duration for the item lock, in milliseconds
    #[arg(long, default_value = "5000")]
    lock_ttl_ms: u64,

    /// Table holding the counter (must exist on DynamoDB)
    #[arg(long, default_value = "CounterTest")]
    table: String,
}

#[derive(Args, Debug)]
struct DemoArgs {
    /// Table holding the users (must exist on DynamoDB)
    #[arg(long, default_value = "User")]
    table: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dynabridge=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let store = open_store(cli.backend, &config).await?;

    match cli.command {
        Command::Counter(args) => run_counter(store, &config, args).await,
        Command::Demo(args) => run_demo(store, &config, args).await,
    }
}

async fn open_store(backend: Backend, config: &Config) -> Result<Arc<dyn ItemStore>> {
    match backend {
        #[cfg(feature = "inmemory")]
        Backend::Memory => Ok(Arc::new(dynabridge::storage::InMemoryStore::new())),
        #[cfg(feature = "dynamodb")]
        Backend::Dynamodb => {
            tracing::info!(endpoint = %config.target_display(), "Connecting to DynamoDB");
            Ok(Arc::new(
                dynabridge::storage::DynamoDbStore::from_config(config).await,
            ))
        }
        #[allow(unreachable_patterns)]
        other => {
            let _ = config;
            bail!("dynabridge was built without the {:?} backend", other)
        }
    }
}

// ============================================================================
// Counter
// ============================================================================

#[derive(Debug, Default)]
struct CounterStats {
    conflicts: AtomicU64,
    lock_contention: AtomicU64,
    expired_leases: AtomicU64,
}

fn counter_schema() -> Result<Schema> {
    Ok(Schema::new().add_attributes([
        AttributeDefinition::new("CounterId", AttributeType::Uuid)
            .required()
            .default_uuid(),
        AttributeDefinition::new("Count", AttributeType::Int)
            .required()
            .default_value(0)
            .validator(|v| v.as_int().is_some_and(|n| n >= 0)),
    ])?)
}

async fn run_counter(store: Arc<dyn ItemStore>, config: &Config, args: CounterArgs) -> Result<()> {
    let binding = Arc::new(
        TableBinding::builder(&args.table, counter_schema()?, "CounterId")
            .with_config(config)
            .lock_attribute(COUNTER_LOCK)
            .build(store)?,
    );

    let mut counter = Record::new(&binding);
    counter.save().await.context("creating the counter")?;
    let key = counter.key()?;
    tracing::info!(%key, workers = args.workers, increments = args.increments, use_lock = args.use_lock, "Counter created");

    let stats = Arc::new(CounterStats::default());
    let ttl = Duration::from_millis(args.lock_ttl_ms);
    let backoff = config.retry_policy();
    let started = Instant::now();

    let mut handles = Vec::new();
    for worker in 0..args.workers {
        let binding = Arc::clone(&binding);
        let key = key.clone();
        let stats = Arc::clone(&stats);
        let use_lock = args.use_lock;
        let increments = args.increments;
        handles.push(tokio::spawn(async move {
            for _ in 0..increments {
                if use_lock {
                    increment_locked(&binding, &key, ttl, backoff, &stats).await?;
                } else {
                    increment_optimistic(&binding, &key, backoff, &stats).await?;
                }
            }
            tracing::debug!(worker, "Worker finished");
            Ok::<_, DynaError>(())
        }));
    }

    let mut failures = 0;
    for handle in handles {
        if let Err(err) = handle.await? {
            tracing::error!(error = %err, "Worker failed");
            failures += 1;
        }
    }

    let stored = Record::load(&binding, &key)
        .await?
        .context("counter disappeared")?;
    let actual = stored.get("Count").and_then(Value::as_int).unwrap_or_default();
    let expected = args.workers * args.increments;

    println!("Counter:          {}", key);
    println!("Mode:             {}", if args.use_lock { "lock" } else { "optimistic" });
    println!("Expected:         {}", expected);
    println!("Actual:           {}", actual);
    println!("Version:          {}", stored.version().unwrap_or_default());
    println!("Conflicts:        {}", stats.conflicts.load(Ordering::Relaxed));
    println!("Lock contention:  {}", stats.lock_contention.load(Ordering::Relaxed));
    println!("Expired leases:   {}", stats.expired_leases.load(Ordering::Relaxed));
    println!("Failed workers:   {}", failures);
    println!("Elapsed:          {:?}", started.elapsed());

    if actual != expected as i64 {
        bail!("lost updates: expected {}, found {}", expected, actual);
    }
    Ok(())
}

/// Reads, increments and saves, re-reading after every conflict with
/// exponential backoff.
async fn increment_optimistic(
    binding: &Arc<TableBinding>,
    key: &ItemKey,
    backoff: RetryPolicy,
    stats: &CounterStats,
) -> Result<(), DynaError> {
    let mut attempt = 0;
    loop {
        match increment_once(binding, key).await {
            Ok(_) => return Ok(()),
            Err(err) if err.recovery() == Recovery::RefetchAndRetry && attempt + 1 < MAX_ATTEMPTS => {
                stats.conflicts.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(%key, attempt, error = %err, "Conflict, re-reading counter");
                tokio::time::sleep(backoff.delay_for(attempt)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Increments inside the counter lock, backing off while it is held.
async fn increment_locked(
    binding: &Arc<TableBinding>,
    key: &ItemKey,
    ttl: Duration,
    backoff: RetryPolicy,
    stats: &CounterStats,
) -> Result<(), DynaError> {
    let lock = Lock::new(binding, key.clone(), COUNTER_LOCK)?;
    for attempt in 0..MAX_ATTEMPTS {
        match lock
            .with_lock(Some(ttl), || increment_once(binding, key))
            .await
        {
            Ok(guarded) => {
                if guarded.expired_during_work() {
                    stats.expired_leases.fetch_add(1, Ordering::Relaxed);
                }
                return guarded.into_inner().map(|_| ());
            }
            Err(DynaError::LockHeld { .. }) => {
                stats.lock_contention.fetch_add(1, Ordering::Relaxed);
                tokio::time::sleep(backoff.delay_for(attempt)).await;
            }
            Err(err) => return Err(err),
        }
    }
    Err(DynaError::LockHeld {
        attribute: COUNTER_LOCK.to_string(),
        owner: None,
    })
}

async fn increment_once(binding: &Arc<TableBinding>, key: &ItemKey) -> Result<u64, DynaError> {
    let mut counter = Record::load(binding, key)
        .await?
        .ok_or_else(|| DynaError::NotFound {
            key: key.to_string(),
        })?;
    let count = counter.get("Count").and_then(Value::as_int).unwrap_or_default();
    counter.set("Count", count + 1)?;
    counter.save().await
}

// ============================================================================
// Demo
// ============================================================================

fn user_schema() -> Result<Schema> {
    Ok(Schema::new().add_attributes([
        AttributeDefinition::new("UserId", AttributeType::Uuid)
            .required()
            .default_uuid(),
        AttributeDefinition::new("Name", AttributeType::String).required(),
        AttributeDefinition::new("Country", AttributeType::String)
            .required()
            .default_value("India"),
        AttributeDefinition::new("Email", AttributeType::String)
            .default_value("admin+missing@example.com")
            .validator(|v| v.as_str().is_some_and(|s| s.contains('@'))),
        AttributeDefinition::new("Status", AttributeType::String).required(),
    ])?)
}

async fn run_demo(store: Arc<dyn ItemStore>, config: &Config, args: DemoArgs) -> Result<()> {
    let schema = user_schema()?;
    println!(
        "Schema:\n{}",
        serde_json::to_string_pretty(&schema.describe())?
    );
    let binding = Arc::new(
        TableBinding::builder(&args.table, schema, "UserId")
            .with_config(config)
            .build(store)?,
    );

    let mut raj = Record::from_values(
        &binding,
        item! { "Name" => "Raj", "Email" => "admin@admin.in", "Status" => "Active" },
    );
    raj.save().await?;
    let key = raj.key()?;
    println!("Saved:\n{}", serde_json::to_string_pretty(&raj.to_json())?);

    let mut ana = Record::from_values(
        &binding,
        item! { "Name" => "Ana", "Country" => "Peru", "Status" => "Active" },
    );
    ana.save().await?;

    let invalid = Record::from_values(&binding, item! { "Name" => "Bob", "Email" => "bob" })
        .save()
        .await;
    if let Err(err) = invalid {
        println!("Rejected invalid user: {}", err);
    }

    let fetched = Record::load(&binding, &key)
        .await?
        .context("saved user not found")?;
    println!(
        "Fetched by key (version {}):\n{}",
        fetched.version().unwrap_or_default(),
        serde_json::to_string_pretty(&fetched.to_json())?
    );

    let indians = Record::find_by_attribute(&binding, "Country", "India").await?;
    println!("Users in India: {}", indians.len());
    for user in &indians {
        println!("  {}", user.to_json());
    }

    raj.set("Status", "Inactive")?;
    let version = raj.save().await?;
    println!("Updated status, now at version {}", version);

    raj.set("Name", "Rajesh")?;
    match raj.save_if(Condition::eq("Status", "Active")).await {
        Ok(version) => println!("Conditional save applied at version {}", version),
        Err(err) => println!("Conditional save refused: {}", err),
    }

    let mut stale = fetched;
    stale.set("Name", "Stale Raj")?;
    match stale.save().await {
        Ok(_) => println!("Stale save unexpectedly succeeded"),
        Err(err) if err.is_conflict() => println!("Stale save refused: {}", err),
        Err(err) => return Err(err.into()),
    }

    raj.refresh().await?;
    raj.delete().await?;
    println!("Deleted {}", key);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use dynabridge::storage::InMemoryStore;

    fn fast_backoff() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(4))
    }

    async fn counter(store: InMemoryStore) -> (Arc<TableBinding>, ItemKey) {
        let binding = Arc::new(
            TableBinding::builder("CounterTest", counter_schema().unwrap(), "CounterId")
                .lock_attribute(COUNTER_LOCK)
                .retry_policy(fast_backoff())
                .build(Arc::new(store))
                .unwrap(),
        );
        let mut counter = Record::new(&binding);
        counter.save().await.unwrap();
        let key = counter.key().unwrap();
        (binding, key)
    }

    async fn run_workers(use_lock: bool) -> (i64, Arc<CounterStats>) {
        let (binding, key) = counter(InMemoryStore::new()).await;
        let stats = Arc::new(CounterStats::default());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let binding = Arc::clone(&binding);
            let key = key.clone();
            let stats = Arc::clone(&stats);
            handles.push(tokio::spawn(async move {
                for _ in 0..3 {
                    if use_lock {
                        increment_locked(&binding, &key, Duration::from_secs(5), fast_backoff(), &stats)
                            .await?;
                    } else {
                        increment_optimistic(&binding, &key, fast_backoff(), &stats).await?;
                    }
                }
                Ok::<_, DynaError>(())
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let stored = Record::load(&binding, &key).await.unwrap().unwrap();
        (stored.get("Count").and_then(Value::as_int).unwrap(), stats)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_optimistic_counter_loses_no_updates() {
        let (count, _) = run_workers(false).await;
        assert_eq!(count, 24);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_locked_counter_loses_no_updates() {
        let (count, stats) = run_workers(true).await;
        assert_eq!(count, 24);
        assert_eq!(stats.expired_leases.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_optimistic_increment_stops_on_missing_counter() {
        let (binding, _) = counter(InMemoryStore::new()).await;
        let stats = CounterStats::default();

        let result =
            increment_optimistic(&binding, &binding.key(uuid_key()), fast_backoff(), &stats).await;

        assert!(matches!(result, Err(DynaError::NotFound { .. })));
        assert_eq!(stats.conflicts.load(Ordering::Relaxed), 0);
    }

    fn uuid_key() -> Value {
        Value::Uuid(uuid::Uuid::new_v4())
    }
}
