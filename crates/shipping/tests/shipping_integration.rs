//! Cargo commands through dispatch, persistence, projections and queries.

use std::sync::Arc;

use common::{AggregateId, Issuer};
use domain::{CommandDispatcher, CommandEnvelope, CommandHandler, ErrorKind};
use event_store::{EventStore, InMemoryEventStore, Version};
use projections::{
    Criteria, GetByIdQuery, InMemoryReadStore, InProcessEventBus, ListQuery, Projection,
    ProjectionProcessor, QueryDispatcher, QueryEnvelope, QuerySpec, ReadStoreExt, Sort,
};
use serde_json::json;
use shipping::{
    CargoCommand, CargoStatus, CargoSummary, CargoSummaryProjection, DestinationLoad,
    DestinationLoadProjection,
};

struct Harbour {
    store: InMemoryEventStore,
    reads: InMemoryReadStore,
    projections: Vec<Arc<dyn Projection>>,
    handler: Arc<CommandHandler<InMemoryEventStore, shipping::Cargo>>,
    commands: CommandDispatcher,
    queries: QueryDispatcher,
}

impl Harbour {
    fn new() -> Self {
        let store = InMemoryEventStore::new();
        let reads = InMemoryReadStore::new();
        let projections: Vec<Arc<dyn Projection>> = vec![
            Arc::new(CargoSummaryProjection::new(reads.clone())),
            Arc::new(DestinationLoadProjection::new(reads.clone())),
        ];
        let bus = Arc::new(InProcessEventBus::new(projections.clone()));
        let handler = Arc::new(CommandHandler::new(store.clone(), bus));

        let mut commands = CommandDispatcher::new();
        commands
            .register::<_, CargoCommand>(handler.clone())
            .unwrap();
        commands.freeze();

        let mut queries = QueryDispatcher::new();
        queries
            .register(
                "GetCargo",
                Arc::new(GetByIdQuery::<CargoSummary, _>::new(reads.clone())),
            )
            .unwrap();
        queries
            .register(
                "ListCargo",
                Arc::new(ListQuery::<CargoSummary, _>::new(reads.clone())),
            )
            .unwrap();
        queries
            .register(
                "ListDestinations",
                Arc::new(ListQuery::<DestinationLoad, _>::new(reads.clone())),
            )
            .unwrap();
        queries.freeze();

        Self {
            store,
            reads,
            projections,
            handler,
            commands,
            queries,
        }
    }

    async fn send(
        &self,
        id: AggregateId,
        command_type: &str,
        payload: serde_json::Value,
    ) -> domain::CommandResult {
        let envelope =
            CommandEnvelope::new(command_type, id, "Cargo", payload).with_issuer("dockmaster");
        self.commands.dispatch(envelope).await
    }

    async fn register(&self, code: &str, destination: &str, max_weight: u64) -> AggregateId {
        let id = AggregateId::new();
        let result = self
            .send(
                id,
                "Register",
                json!({
                    "code": code,
                    "origin": "Antwerp",
                    "destination": destination,
                    "maxWeight": max_weight,
                    "maxVolume": 100
                }),
            )
            .await;
        assert!(result.success, "{:?}", result.error);
        id
    }

    async fn load(&self, id: AggregateId, shipment: &str, weight: u64) -> domain::CommandResult {
        self.send(
            id,
            "LoadShipment",
            json!({ "shipmentId": shipment, "weight": weight, "volume": 1 }),
        )
        .await
    }
}

#[tokio::test]
async fn loading_over_capacity_keeps_version() {
    let harbour = Harbour::new();
    let id = harbour.register("CG-1", "Lagos", 1000).await;
    assert!(harbour.load(id, "SHP-1", 800).await.success);

    let result = harbour.load(id, "SHP-2", 300).await;
    assert!(!result.success);
    assert_eq!(result.error_kind(), Some(ErrorKind::Validation));
    let message = result.error.unwrap().message;
    assert!(message.contains("would exceed weight capacity"), "{message}");

    assert_eq!(
        harbour.store.get_aggregate_version(id).await.unwrap(),
        Some(Version::new(2))
    );
    let summary: CargoSummary = harbour.reads.get_model(&id.to_string()).await.unwrap().unwrap();
    assert_eq!(summary.total_weight, 800);
    assert_eq!(summary.version, Version::new(2));
}

#[tokio::test]
async fn overflowing_shipment_weight_is_rejected() {
    let harbour = Harbour::new();
    let id = harbour.register("CG-1", "Lagos", 1000).await;
    assert!(harbour.load(id, "SHP-1", 800).await.success);

    let result = harbour.load(id, "SHP-2", u64::MAX).await;
    assert!(!result.success);
    assert_eq!(result.error_kind(), Some(ErrorKind::Validation));
    assert_eq!(
        harbour.store.get_aggregate_version(id).await.unwrap(),
        Some(Version::new(2))
    );

    let summary: CargoSummary = harbour.reads.get_model(&id.to_string()).await.unwrap().unwrap();
    assert_eq!(summary.total_weight, 800);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_registrations_all_reach_the_destination() {
    for _ in 0..20 {
        let harbour = Harbour::new();
        let tasks: Vec<_> = (0..8)
            .map(|n| {
                let handler = harbour.handler.clone();
                tokio::spawn(async move {
                    let command = CargoCommand::Register {
                        code: format!("CG-{n}"),
                        origin: "Antwerp".into(),
                        destination: "Rotterdam".into(),
                        max_weight: 1000,
                        max_volume: 100,
                    };
                    handler
                        .handle(AggregateId::new(), command, Issuer::System)
                        .await
                })
            })
            .collect();
        for task in tasks {
            let result = task.await.unwrap().unwrap();
            assert!(result.success);
        }

        let rotterdam: DestinationLoad =
            harbour.reads.get_model("Rotterdam").await.unwrap().unwrap();
        assert_eq!(rotterdam.cargos.len(), 8);
        assert_eq!(rotterdam.active_cargo_count, 8);
    }
}

#[tokio::test]
async fn voyage_updates_both_read_models() {
    let harbour = Harbour::new();
    let a = harbour.register("CG-A", "Lagos", 1000).await;
    let b = harbour.register("CG-B", "Lagos", 1000).await;
    harbour.load(a, "SHP-1", 100).await;
    harbour.load(b, "SHP-2", 250).await;

    let result = harbour.send(a, "Depart", serde_json::Value::Null).await;
    assert!(result.success);
    assert_eq!(result.version, Version::new(3));
    assert_eq!(result.events.len(), 1);
    assert_eq!(result.events[0].event_type, "CargoDeparted");
    assert_eq!(result.data["status"], "InTransit");

    harbour.send(a, "Arrive", json!({})).await;

    let get = harbour
        .queries
        .dispatch(QueryEnvelope::new(
            "GetCargo",
            QuerySpec::new(Criteria::new().id(a.to_string())),
        ))
        .await;
    assert!(get.success);
    assert_eq!(get.data["status"], "Arrived");

    let lagos: DestinationLoad = harbour.reads.get_model("Lagos").await.unwrap().unwrap();
    assert_eq!(lagos.active_cargo_count, 1);
    assert_eq!(lagos.total_weight, 250);
    assert_eq!(lagos.cargo_codes, vec!["CG-B"]);
}

#[tokio::test]
async fn list_queries_filter_and_sort() {
    let harbour = Harbour::new();
    for (code, destination) in [("CG-3", "Oslo"), ("CG-1", "Lima"), ("CG-2", "Oslo")] {
        let id = harbour.register(code, destination, 500).await;
        harbour.load(id, &format!("SHP-{code}"), 10).await;
    }

    let oslo = harbour
        .queries
        .dispatch(QueryEnvelope::new(
            "ListCargo",
            QuerySpec::new(Criteria::new().filter("destination", "Oslo")).sort(Sort::asc("code")),
        ))
        .await;
    assert_eq!(oslo.data["totalCount"], 2);
    assert_eq!(oslo.data["items"][0]["code"], "CG-2");
    assert_eq!(oslo.data["items"][1]["code"], "CG-3");
    assert_eq!(oslo.data["hasMore"], false);

    let by_shipment = harbour
        .queries
        .dispatch(QueryEnvelope::new(
            "ListCargo",
            QuerySpec::new(Criteria::new().filter("shipmentIds", "SHP-CG-1")),
        ))
        .await;
    assert_eq!(by_shipment.data["items"][0]["destination"], "Lima");

    let destinations = harbour
        .queries
        .dispatch(QueryEnvelope::new(
            "ListDestinations",
            QuerySpec::default().sort(Sort::desc("totalWeight")),
        ))
        .await;
    assert_eq!(destinations.data["items"][0]["destination"], "Oslo");
    assert_eq!(destinations.data["items"][0]["totalWeight"], 20);
}

#[tokio::test]
async fn stale_writer_loses() {
    let harbour = Harbour::new();
    let id = harbour.register("CG-1", "Lagos", 1000).await;
    let repository = harbour.handler.repository();

    let mut first = repository.get_by_id(id).await.unwrap();
    let mut second = repository.get_by_id(id).await.unwrap();
    first
        .execute(|c| c.load_shipment("SHP-1", 600, 1))
        .unwrap();
    second
        .execute(|c| c.load_shipment("SHP-2", 600, 1))
        .unwrap();

    let expected = first.original_version();
    repository.save(&mut first, expected).await.unwrap();
    let expected = second.original_version();
    let err = repository.save(&mut second, expected).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConcurrencyConflict);

    let history = harbour.store.get_events_for_aggregate(id).await.unwrap();
    let versions: Vec<i64> = history.iter().map(|e| e.version.as_i64()).collect();
    assert_eq!(versions, vec![1, 2]);

    let reloaded = repository.get_by_id(id).await.unwrap();
    assert!(reloaded.state().shipment("SHP-1").is_some());
    assert!(reloaded.state().shipment("SHP-2").is_none());
}

#[tokio::test]
async fn deleted_cargo_rejects_commands() {
    let harbour = Harbour::new();
    let id = harbour.register("CG-1", "Lagos", 1000).await;

    assert!(harbour.send(id, "Delete", json!({})).await.success);
    let result = harbour.load(id, "SHP-1", 1).await;
    assert_eq!(result.error_kind(), Some(ErrorKind::Validation));
    assert!(result.error.unwrap().message.contains("deleted"));

    let summary: CargoSummary = harbour.reads.get_model(&id.to_string()).await.unwrap().unwrap();
    assert!(summary.deleted);
    assert_eq!(summary.status, CargoStatus::Docked);
}

#[tokio::test]
async fn rebuild_matches_incremental_state() {
    let harbour = Harbour::new();
    let a = harbour.register("CG-A", "Oslo", 1000).await;
    let b = harbour.register("CG-B", "Lima", 1000).await;
    harbour.load(a, "SHP-1", 300).await;
    harbour.load(b, "SHP-2", 400).await;
    harbour.send(b, "UnloadShipment", json!({ "shipmentId": "SHP-2" })).await;
    harbour.send(a, "Depart", json!({})).await;

    let spec = QuerySpec::default().sort(Sort::asc("code"));
    let summaries = harbour.reads.query_models::<CargoSummary>(&spec).await.unwrap();
    let loads = harbour
        .reads
        .query_models::<DestinationLoad>(&QuerySpec::default())
        .await
        .unwrap();

    let mut processor = ProjectionProcessor::new(harbour.store.clone(), harbour.reads.clone());
    for projection in &harbour.projections {
        processor.register(projection.clone()).unwrap();
    }
    processor.freeze();
    processor.rebuild_all().await.unwrap();

    assert_eq!(
        harbour.reads.query_models::<CargoSummary>(&spec).await.unwrap(),
        summaries
    );
    assert_eq!(
        harbour
            .reads
            .query_models::<DestinationLoad>(&QuerySpec::default())
            .await
            .unwrap(),
        loads
    );
}

#[tokio::test]
async fn unknown_command_type_is_unsupported() {
    let harbour = Harbour::new();
    let result = harbour.send(AggregateId::new(), "Scuttle", json!({})).await;
    assert_eq!(result.error_kind(), Some(ErrorKind::UnsupportedType));
}
