//! Task Orchestration CLI
//!
//! Administrative command-line tool: create, list, and drive tasks
//! through the orchestration core against Postgres.

use std::collections::HashMap;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};

use orch_common::config::OrchestratorConfig;
use orch_common::init_tracing;
use orch_core::api::OrchestratorApi;
use orch_core::context::ContextStore;
use orch_core::executor::StepExecutorRegistry;
use orch_core::notification::{NotificationDispatcher, NotificationHub, SystemLogChannel, WebsocketChannel};
use orch_core::recovery::{default_policy_table, RecoveryEngine};
use orch_core::scheduler::{DispatchConfig, LocalJobQueue, Scheduler};
use orch_core::state::StateManager;
use orch_core::validator::Validator;
use orch_db::repo::{
    NewTask, PgContextRepository, PgNotificationRepository, PgRecoveryRepository, PgStateRepository,
    PgSubscriberRepository, PgTaskRepository, TaskFilters,
};
use orch_db::pagination::Pagination;
use orch_domain::enums::{NotificationChannelKind, TaskPriority, TaskType};
use orch_domain::ids::TaskId;

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

#[derive(Parser)]
#[command(name = "orch")]
#[command(about = "Task orchestration administration CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Task management commands
    Task {
        #[command(subcommand)]
        action: TaskCommands,
    },
}

#[derive(ValueEnum, Clone, Copy)]
enum CliPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl From<CliPriority> for TaskPriority {
    fn from(p: CliPriority) -> Self {
        match p {
            CliPriority::Low => TaskPriority::Low,
            CliPriority::Medium => TaskPriority::Medium,
            CliPriority::High => TaskPriority::High,
            CliPriority::Critical => TaskPriority::Critical,
        }
    }
}

#[derive(Subcommand)]
enum TaskCommands {
    /// Create a task and leave it in `initialized`
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: String,
        #[arg(long, value_enum, default_value_t = CliPriority::Medium)]
        priority: CliPriority,
    },
    /// List tasks
    List,
    /// Admit a task's processing loop
    Execute { task_id: TaskId },
    /// Show a task's status, progress, and history
    Status { task_id: TaskId },
    /// Pause a task
    Pause { task_id: TaskId },
    /// Resume a paused task
    Resume { task_id: TaskId },
    /// Cancel a task
    Cancel { task_id: TaskId },
}

async fn bootstrap(config: &OrchestratorConfig) -> anyhow::Result<OrchestratorApi> {
    let pool = orch_db::connect(&config.database_url).await?;

    let task_repo = Arc::new(PgTaskRepository::new(pool.clone()));
    let context_repo = Arc::new(PgContextRepository::new(pool.clone()));
    let state_repo = Arc::new(PgStateRepository::new(pool.clone()));
    let recovery_repo = Arc::new(PgRecoveryRepository::new(pool.clone()));
    let notification_repo = Arc::new(PgNotificationRepository::new(pool.clone()));
    let subscriber_repo = Arc::new(PgSubscriberRepository::new(pool));

    let validator = Arc::new(Validator::new(MAX_METADATA_BYTES));
    let context_store = Arc::new(ContextStore::new(context_repo.clone(), validator.clone()));
    let state_manager = Arc::new(StateManager::new(
        state_repo,
        context_repo,
        task_repo.clone(),
        validator,
    ));
    let recovery = Arc::new(RecoveryEngine::new(default_policy_table(), recovery_repo));

    let hub = Arc::new(NotificationHub::new());
    let mut channels: HashMap<NotificationChannelKind, Arc<dyn orch_core::notification::NotificationChannel>> =
        HashMap::new();
    channels.insert(
        NotificationChannelKind::SystemLog,
        Arc::new(SystemLogChannel::new(notification_repo.clone())),
    );
    channels.insert(NotificationChannelKind::Websocket, Arc::new(WebsocketChannel::new(hub)));
    let notifications = Arc::new(NotificationDispatcher::new(
        channels,
        subscriber_repo,
        notification_repo,
        config.channels.clone(),
    ));

    let registry = Arc::new(StepExecutorRegistry::new());
    let job_queue = Arc::new(LocalJobQueue::new(registry.clone(), context_store.clone()));
    let scheduler = Arc::new(Scheduler::new(
        config.max_concurrent_tasks,
        config.admission.queue_capacity,
        state_manager.clone(),
        context_store.clone(),
        registry,
        recovery,
        notifications.clone(),
        task_repo.clone(),
        job_queue,
        dispatch_config(config),
    ));

    Ok(OrchestratorApi::new(
        task_repo,
        context_store,
        state_manager,
        scheduler,
        notifications,
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = OrchestratorConfig::load()?;
    let api = bootstrap(&config).await?;

    match cli.command {
        Commands::Task { action } => match action {
            TaskCommands::Create {
                title,
                description,
                priority,
            } => {
                let task = api
                    .create_task(NewTask {
                        title,
                        description,
                        priority: priority.into(),
                        task_type: TaskType::Feature,
                        project_id: None,
                        assignee: None,
                        tags: vec![],
                    })
                    .await?;
                api.initialize_task(task.id, HashMap::new()).await?;
                println!("created task {}", task.id);
            }
            TaskCommands::List => {
                let page = api.list_tasks(TaskFilters::default(), Pagination::default()).await?;
                for task in page.items {
                    println!("{}  {}  {}", task.id, task.current_state, task.title);
                }
            }
            TaskCommands::Execute { task_id } => {
                let outcome = api.execute_task(task_id).await?;
                println!("{outcome:?}");
            }
            TaskCommands::Status { task_id } => {
                let status = api.get_status(task_id).await?;
                println!(
                    "state={} progress={}%",
                    status.state, status.progress_percent
                );
            }
            TaskCommands::Pause { task_id } => {
                api.pause_task(task_id).await?;
                println!("paused {task_id}");
            }
            TaskCommands::Resume { task_id } => {
                api.resume_task(task_id).await?;
                println!("resumed {task_id}");
            }
            TaskCommands::Cancel { task_id } => {
                api.cancel_task(task_id).await?;
                println!("cancelled {task_id}");
            }
        },
    }

    Ok(())
}
