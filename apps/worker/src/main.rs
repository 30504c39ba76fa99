//! Task Orchestration Worker
//!
//! Boots the orchestration core against Postgres: validator, context
//! store, state manager, recovery engine, notification dispatcher, and
//! scheduler, then idles until shut down. Concrete Step Executors are
//! an external plug-in surface and are not registered here.

use std::collections::HashMap;
use std::sync::Arc;

use orch_common::config::OrchestratorConfig;
use orch_common::init_tracing;
use orch_core::context::ContextStore;
use orch_core::executor::StepExecutorRegistry;
use orch_core::notification::{
    NotificationDispatcher, NotificationHub, SystemLogChannel, WebhookChannel, WebsocketChannel,
};
use orch_core::recovery::RecoveryEngine;
use orch_core::scheduler::{DispatchConfig, LocalJobQueue, Scheduler};
use orch_core::state::StateManager;
use orch_core::validator::Validator;
use orch_db::repo::{
    PgContextRepository, PgNotificationRepository, PgRecoveryRepository, PgStateRepository,
    PgSubscriberRepository, PgTaskRepository,
};
use orch_domain::enums::NotificationChannelKind;

const MAX_METADATA_BYTES: usize = 1 << 20;
const DEFAULT_STEP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(300);

fn dispatch_config(config: &OrchestratorConfig) -> DispatchConfig {
    DispatchConfig {
        long_running_steps: config.long_running_steps.iter().cloned().collect(),
        step_timeouts: config
            .step_timeouts
            .iter()
            .map(|(step, ms)| (step.clone(), std::time::Duration::from_millis(*ms)))
            .collect(),
        default_step_timeout: DEFAULT_STEP_TIMEOUT,
    }
}

fn recovery_overrides(
    config: &orch_common::config::RecoveryConfig,
) -> HashMap<orch_domain::enums::ErrorType, orch_core::recovery::RecoveryPolicy> {
    use orch_core::recovery::default_policy_table;
    let defaults = default_policy_table();
    config
        .overrides
        .iter()
        .map(|(error_type, over)| {
            let base = defaults.get(error_type).copied().unwrap_or(
                orch_core::recovery::RecoveryPolicy {
                    strategy: over.strategy,
                    max_attempts: 3,
                    initial_delay_ms: 1000,
                    max_delay_ms: 30_000,
                    factor: 2.0,
                },
            );
            let policy = orch_core::recovery::RecoveryPolicy {
                strategy: over.strategy,
                max_attempts: over.max_attempts.unwrap_or(base.max_attempts),
                initial_delay_ms: over.initial_backoff_ms.unwrap_or(base.initial_delay_ms),
                max_delay_ms: over.max_backoff_ms.unwrap_or(base.max_delay_ms),
                factor: over.backoff_multiplier.unwrap_or(base.factor),
            };
            (*error_type, policy)
        })
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = OrchestratorConfig::load()?;
    tracing::info!(max_concurrent_tasks = config.max_concurrent_tasks, "starting orchestration worker");

    let pool = orch_db::connect(&config.database_url).await?;

    let task_repo = Arc::new(PgTaskRepository::new(pool.clone()));
    let context_repo = Arc::new(PgContextRepository::new(pool.clone()));
    let state_repo = Arc::new(PgStateRepository::new(pool.clone()));
    let recovery_repo = Arc::new(PgRecoveryRepository::new(pool.clone()));
    let notification_repo = Arc::new(PgNotificationRepository::new(pool.clone()));
    let subscriber_repo = Arc::new(PgSubscriberRepository::new(pool.clone()));

    let validator = Arc::new(Validator::new(MAX_METADATA_BYTES));
    let context_store = Arc::new(ContextStore::new(context_repo.clone(), validator.clone()));
    let state_manager = Arc::new(StateManager::new(
        state_repo,
        context_repo,
        task_repo.clone(),
        validator,
    ));
    let recovery = Arc::new(RecoveryEngine::new(
        recovery_overrides(&config.recovery),
        recovery_repo,
    ));

    let hub = Arc::new(NotificationHub::new());
    let mut channels: HashMap<NotificationChannelKind, Arc<dyn orch_core::notification::NotificationChannel>> =
        HashMap::new();
    channels.insert(
        NotificationChannelKind::SystemLog,
        Arc::new(SystemLogChannel::new(notification_repo.clone())),
    );
    channels.insert(
        NotificationChannelKind::Websocket,
        Arc::new(WebsocketChannel::new(hub.clone())),
    );
    if let Ok(endpoint) = std::env::var("ORCHESTRATOR_WEBHOOK_ENDPOINT") {
        channels.insert(
            NotificationChannelKind::Webhook,
            Arc::new(WebhookChannel::new(reqwest::Client::new(), endpoint)),
        );
    }
    let notifications = Arc::new(NotificationDispatcher::new(
        channels,
        subscriber_repo,
        notification_repo,
        config.channels.clone(),
    ));

    let registry = Arc::new(StepExecutorRegistry::new());
    if let Err(err) = registry.verify_complete() {
        tracing::warn!(%err, "step executor registry incomplete; no executors are wired into this binary");
    }

    let job_queue = Arc::new(LocalJobQueue::new(registry.clone(), context_store.clone()));
    let scheduler = Arc::new(Scheduler::new(
        config.max_concurrent_tasks,
        config.admission.queue_capacity,
        state_manager,
        context_store,
        registry,
        recovery,
        notifications,
        task_repo,
        job_queue,
        dispatch_config(&config),
    ));
    let _ = scheduler;

    tracing::info!("orchestration worker ready");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down orchestration worker");
    Ok(())
}
