//! Wires stores, projections, buses and dispatchers into one runnable unit.

use std::sync::Arc;

use accounts::{User, UserCommand, UserProfile, UserProfileProjection};
use domain::{CommandDispatcher, CommandEnvelope, CommandHandler, CommandResult, EventBus};
use event_store::EventStore;
use projections::{
    ChannelEventBus, GetByIdQuery, InMemoryReadStore, InProcessEventBus, ListQuery, Projection,
    ProjectionProcessor, QueryDispatcher, QueryEnvelope, QueryResult,
};
use shipping::{
    Cargo, CargoCommand, CargoSummary, CargoSummaryProjection, DestinationLoad,
    DestinationLoadProjection,
};

use crate::ServerError;
use crate::config::{Config, ProjectionDelivery};

/// Command and query surface over a single event store.
///
/// Built once at startup. The registries are frozen before `build` returns,
/// so every route and projection is fixed for the lifetime of the engine.
pub struct Engine<S> {
    commands: CommandDispatcher,
    queries: QueryDispatcher,
    processor: ProjectionProcessor<S, InMemoryReadStore>,
    channel: Option<Arc<ChannelEventBus>>,
}

impl<S> Engine<S>
where
    S: EventStore + Clone + 'static,
{
    /// Must be called inside a Tokio runtime when delivery is
    /// [`ProjectionDelivery::Channel`].
    pub fn build(store: S, config: &Config) -> Result<Self, ServerError> {
        let reads = InMemoryReadStore::with_max_page_size(config.max_page_size);
        let projections: Vec<Arc<dyn Projection>> = vec![
            Arc::new(CargoSummaryProjection::new(reads.clone())),
            Arc::new(DestinationLoadProjection::new(reads.clone())),
            Arc::new(UserProfileProjection::new(reads.clone())),
        ];

        let channel = match config.projection_delivery {
            ProjectionDelivery::Channel => {
                Some(Arc::new(ChannelEventBus::spawn(projections.clone())))
            }
            ProjectionDelivery::Inline => None,
        };
        let bus: Arc<dyn EventBus> = match &channel {
            Some(channel) => channel.clone(),
            None => Arc::new(InProcessEventBus::new(projections.clone())),
        };

        let mut commands = CommandDispatcher::new();
        commands.register::<_, CargoCommand>(Arc::new(CommandHandler::<S, Cargo>::new(
            store.clone(),
            bus.clone(),
        )))?;
        commands.register::<_, UserCommand>(Arc::new(CommandHandler::<S, User>::new(
            store.clone(),
            bus,
        )))?;
        commands.freeze();

        let mut queries = QueryDispatcher::new();
        queries.register(
            "GetCargo",
            Arc::new(GetByIdQuery::<CargoSummary, _>::new(reads.clone())),
        )?;
        queries.register(
            "ListCargo",
            Arc::new(ListQuery::<CargoSummary, _>::new(reads.clone())),
        )?;
        queries.register(
            "GetDestinationLoad",
            Arc::new(GetByIdQuery::<DestinationLoad, _>::new(reads.clone())),
        )?;
        queries.register(
            "ListDestinationLoads",
            Arc::new(ListQuery::<DestinationLoad, _>::new(reads.clone())),
        )?;
        queries.register(
            "GetUser",
            Arc::new(GetByIdQuery::<UserProfile, _>::new(reads.clone())),
        )?;
        queries.register(
            "ListUsers",
            Arc::new(ListQuery::<UserProfile, _>::new(reads.clone())),
        )?;
        queries.freeze();

        let mut processor = ProjectionProcessor::new(store, reads);
        for projection in projections {
            processor.register(projection)?;
        }
        processor.freeze();

        Ok(Self {
            commands,
            queries,
            processor,
            channel,
        })
    }

    /// Rebuilds projections whose version changed, then replays the log so
    /// read models reflect events committed before this process started.
    pub async fn start(&self) -> Result<(), ServerError> {
        let rebuilt = self.processor.ensure_current().await?;
        let report = self.processor.run_catch_up().await?;
        tracing::info!(
            ?rebuilt,
            events = report.events,
            applied = report.applied,
            skipped = report.skipped,
            failures = report.failures.len(),
            "read models caught up"
        );
        Ok(())
    }

    pub async fn dispatch_command(&self, envelope: CommandEnvelope) -> CommandResult {
        self.commands.dispatch(envelope).await
    }

    pub async fn dispatch_query(&self, envelope: QueryEnvelope) -> QueryResult {
        self.queries.dispatch(envelope).await
    }

    pub fn command_routes(&self) -> Vec<String> {
        self.commands
            .supported_command_types()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub fn query_types(&self) -> Vec<String> {
        self.queries
            .supported_query_types()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub fn projection_names(&self) -> Vec<&'static str> {
        self.processor
            .projections()
            .iter()
            .map(|projection| projection.name())
            .collect()
    }

    /// Waits until every event published so far has reached the read side.
    /// A no-op for inline delivery.
    pub async fn settle(&self) {
        if let Some(channel) = &self.channel {
            channel.flush().await;
        }
    }

    pub async fn shutdown(&self) {
        if let Some(channel) = &self.channel {
            channel.shutdown().await;
        }
    }
}
