//! Integration tests: command handler → event bus → projection → query
//! dispatcher, using a small ledger aggregate.

use std::sync::Arc;

use async_trait::async_trait;
use common::{AggregateId, Issuer};
use domain::{
    Aggregate, AggregateError, AggregateRoot, Command, CommandHandler, DomainEvent, ErrorKind,
    EventBus,
};
use event_store::{EventEnvelope, EventStore, InMemoryEventStore, Version};
use projections::{
    ChannelEventBus, Criteria, GetByIdQuery, InProcessEventBus, InMemoryReadStore, ListQuery,
    Projection, ProjectionOutcome, ProjectionProcessor, QueryDispatcher, QueryEnvelope,
    QuerySpec, ReadModel, ReadStore, ReadStoreExt, Sort, is_next,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
enum LedgerEvent {
    Opened { owner: String },
    Credited { amount: i64 },
}

impl DomainEvent for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::Opened { .. } => "LedgerOpened",
            LedgerEvent::Credited { .. } => "LedgerCredited",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("ledger is not open")]
struct NotOpen;

#[derive(Debug, Default, Serialize)]
struct Ledger {
    open: bool,
    balance: i64,
}

impl Aggregate for Ledger {
    type Event = LedgerEvent;
    type Error = NotOpen;

    fn aggregate_type() -> &'static str {
        "Ledger"
    }

    fn apply(&mut self, event: &LedgerEvent) {
        match event {
            LedgerEvent::Opened { .. } => self.open = true,
            LedgerEvent::Credited { amount } => self.balance += amount,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
enum LedgerCommand {
    Open { owner: String },
    Credit { amount: i64 },
}

impl Command for LedgerCommand {
    type Aggregate = Ledger;
    const COMMAND_TYPES: &'static [&'static str] = &["Open", "Credit"];

    fn command_type(&self) -> &'static str {
        match self {
            LedgerCommand::Open { .. } => "Open",
            LedgerCommand::Credit { .. } => "Credit",
        }
    }

    fn is_creation(&self) -> bool {
        matches!(self, LedgerCommand::Open { .. })
    }

    fn execute(&self, root: &mut AggregateRoot<Ledger>) -> Result<(), AggregateError<NotOpen>> {
        match self {
            LedgerCommand::Open { owner } => root
                .execute(|_| {
                    Ok(vec![LedgerEvent::Opened {
                        owner: owner.clone(),
                    }])
                })
                .map(drop),
            LedgerCommand::Credit { amount } => root
                .execute(|ledger| {
                    if !ledger.open {
                        return Err(NotOpen);
                    }
                    Ok(vec![LedgerEvent::Credited { amount: *amount }])
                })
                .map(drop),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Balance {
    ledger_id: String,
    owner: String,
    balance: i64,
    postings: u32,
    version: Version,
}

impl ReadModel for Balance {
    const MODEL_TYPE: &'static str = "Balance";

    fn id(&self) -> String {
        self.ledger_id.clone()
    }

    fn version(&self) -> Version {
        self.version
    }

    fn searchable_text(&self) -> String {
        self.owner.clone()
    }
}

struct BalanceProjection {
    store: InMemoryReadStore,
}

#[async_trait]
impl Projection for BalanceProjection {
    fn name(&self) -> &'static str {
        "balances"
    }

    fn aggregate_types(&self) -> &'static [&'static str] {
        &["Ledger"]
    }

    fn can_handle(&self, event_type: &str) -> bool {
        matches!(event_type, "LedgerOpened" | "LedgerCredited")
    }

    async fn project(&self, event: &EventEnvelope) -> projections::Result<ProjectionOutcome> {
        let id = event.aggregate_id.to_string();
        let current: Option<Balance> = self.store.get_model(&id).await?;
        if !is_next(current.as_ref().map(|b| b.version), event)? {
            return Ok(ProjectionOutcome::Skipped);
        }

        let ledger_event: LedgerEvent = serde_json::from_value(event.payload.clone())?;
        let next = match (ledger_event, current) {
            (LedgerEvent::Opened { owner }, _) => Balance {
                ledger_id: id,
                owner,
                balance: 0,
                postings: 0,
                version: event.version,
            },
            (LedgerEvent::Credited { amount }, Some(mut balance)) => {
                balance.balance += amount;
                balance.postings += 1;
                balance.version = event.version;
                balance
            }
            (LedgerEvent::Credited { .. }, None) => return Ok(ProjectionOutcome::Ignored),
        };
        self.store.save_model(&next).await?;
        Ok(ProjectionOutcome::Applied)
    }

    async fn reset(&self) -> projections::Result<()> {
        self.store.clear_type(Balance::MODEL_TYPE).await?;
        Ok(())
    }
}

struct Engine {
    store: InMemoryEventStore,
    reads: InMemoryReadStore,
    projection: Arc<BalanceProjection>,
    handler: CommandHandler<InMemoryEventStore, Ledger>,
    queries: QueryDispatcher,
}

fn engine_with(bus: impl FnOnce(Arc<dyn Projection>) -> Arc<dyn EventBus>) -> Engine {
    let store = InMemoryEventStore::new();
    let reads = InMemoryReadStore::new();
    let projection = Arc::new(BalanceProjection {
        store: reads.clone(),
    });
    let handler = CommandHandler::new(store.clone(), bus(projection.clone()));

    let mut queries = QueryDispatcher::new();
    queries
        .register(
            "GetBalance",
            Arc::new(GetByIdQuery::<Balance, _>::new(reads.clone())),
        )
        .unwrap();
    queries
        .register(
            "ListBalances",
            Arc::new(ListQuery::<Balance, _>::new(reads.clone())),
        )
        .unwrap();
    queries.freeze();

    Engine {
        store,
        reads,
        projection,
        handler,
        queries,
    }
}

fn in_process_engine() -> Engine {
    engine_with(|projection| Arc::new(InProcessEventBus::new(vec![projection])))
}

async fn open_and_credit(engine: &Engine, owner: &str, credits: &[i64]) -> AggregateId {
    let id = AggregateId::new();
    engine
        .handler
        .handle(
            id,
            LedgerCommand::Open {
                owner: owner.into(),
            },
            Issuer::user(owner),
        )
        .await
        .unwrap();
    for amount in credits {
        engine
            .handler
            .handle(id, LedgerCommand::Credit { amount: *amount }, Issuer::System)
            .await
            .unwrap();
    }
    id
}

#[tokio::test]
async fn commands_flow_into_queryable_read_models() {
    let engine = in_process_engine();
    let id = open_and_credit(&engine, "harbour-master", &[10, 25]).await;

    let result = engine
        .queries
        .dispatch(QueryEnvelope::new(
            "GetBalance",
            QuerySpec::new(Criteria::new().id(id.to_string())),
        ))
        .await;
    assert!(result.success);
    assert_eq!(result.data["balance"], 35);
    assert_eq!(result.data["postings"], 2);
    assert_eq!(result.data["version"], 3);
}

#[tokio::test]
async fn redelivery_is_a_no_op() {
    let engine = in_process_engine();
    let id = open_and_credit(&engine, "quay", &[5]).await;
    let before: Balance = engine.reads.get_model(&id.to_string()).await.unwrap().unwrap();

    let history = engine.store.get_events_for_aggregate(id).await.unwrap();
    let projection: Arc<dyn Projection> = engine.projection.clone();
    let bus = InProcessEventBus::new(vec![projection]);
    let report = bus.publish(&history).await;
    assert!(report.is_clean());

    let after: Balance = engine.reads.get_model(&id.to_string()).await.unwrap().unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn undelivered_version_stays_visible_until_rebuild() {
    let engine = in_process_engine();
    let id = open_and_credit(&engine, "dock", &[5]).await;

    // Two more credits commit while their deliveries are lost.
    let silent = CommandHandler::<_, Ledger>::new(
        engine.store.clone(),
        Arc::new(InProcessEventBus::new(Vec::new())),
    );
    for amount in [7, 11] {
        silent
            .handle(id, LedgerCommand::Credit { amount }, Issuer::System)
            .await
            .unwrap();
    }

    let history = engine.store.get_events_for_aggregate(id).await.unwrap();
    let projection: Arc<dyn Projection> = engine.projection.clone();
    let bus = InProcessEventBus::new(vec![projection]);
    for _ in 0..2 {
        let report = bus.publish(&history[3..]).await;
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].version, Version::new(4));
    }
    let stale: Balance = engine.reads.get_model(&id.to_string()).await.unwrap().unwrap();
    assert_eq!(stale.version, Version::new(2));

    let mut processor = ProjectionProcessor::new(engine.store.clone(), engine.reads.clone());
    processor.register(engine.projection.clone()).unwrap();
    processor.freeze();
    processor.rebuild("balances").await.unwrap();

    let balance: Balance = engine.reads.get_model(&id.to_string()).await.unwrap().unwrap();
    assert_eq!(balance.balance, 23);
    assert_eq!(balance.version, Version::new(4));
}

#[tokio::test]
async fn rebuild_reproduces_incremental_state() {
    let engine = in_process_engine();
    for (owner, credits) in [("a", vec![1, 2]), ("b", vec![]), ("c", vec![7, 7, 7])] {
        open_and_credit(&engine, owner, &credits).await;
    }

    let spec = QuerySpec::default().sort(Sort::asc("owner"));
    let incremental = engine
        .reads
        .query_models::<Balance>(&spec)
        .await
        .unwrap();

    let mut processor = ProjectionProcessor::new(engine.store.clone(), engine.reads.clone());
    processor.register(engine.projection.clone()).unwrap();
    processor.freeze();
    processor.rebuild("balances").await.unwrap();

    let rebuilt = engine
        .reads
        .query_models::<Balance>(&spec)
        .await
        .unwrap();
    assert_eq!(rebuilt, incremental);
    assert_eq!(engine.reads.count("Balance").await.unwrap(), 3);
}

#[tokio::test]
async fn channel_bus_is_eventually_consistent() {
    let bus_slot: Arc<std::sync::Mutex<Option<Arc<ChannelEventBus>>>> = Default::default();
    let slot = bus_slot.clone();
    let engine = engine_with(move |projection| {
        let bus = Arc::new(ChannelEventBus::spawn(vec![projection]));
        *slot.lock().unwrap() = Some(bus.clone());
        bus
    });
    let bus = bus_slot.lock().unwrap().clone().unwrap();

    let id = open_and_credit(&engine, "pier", &[3, 4, 5]).await;
    bus.flush().await;

    let balance: Balance = engine.reads.get_model(&id.to_string()).await.unwrap().unwrap();
    assert_eq!(balance.balance, 12);
    assert_eq!(balance.version, Version::new(4));
    bus.shutdown().await;
}

#[tokio::test]
async fn failed_command_leaves_read_side_untouched() {
    let engine = in_process_engine();

    let err = engine
        .handler
        .handle(
            AggregateId::new(),
            LedgerCommand::Credit { amount: 1 },
            Issuer::System,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(engine.reads.count("Balance").await.unwrap(), 0);

    let list = engine
        .queries
        .dispatch(QueryEnvelope::new("ListBalances", QuerySpec::default()))
        .await;
    assert_eq!(list.data["totalCount"], 0);
}
