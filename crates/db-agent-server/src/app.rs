// crates/db-agent-server/src/app.rs
// ============================================================================
// Module: Application
// Description: One-time construction and wiring of every agent service.
// Purpose: Own the adapter, stores, and services; hand them to handlers.
// Dependencies: db-agent-auth, db-agent-config, db-agent-core, stores
// ============================================================================

//! ## Overview
//! The application is constructed exactly once by `main` (or by a test)
//! and passed to HTTP handlers by `Arc`. There is no module-level state:
//! every store, the adapter, the clock, and the authenticator live here.
//! Tests construct isolated applications with an injected clock and an
//! in-memory adapter.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

use db_agent_auth::AgentSignerRegistry;
use db_agent_auth::AgentSignerScheme;
use db_agent_auth::Authenticator;
use db_agent_config::AgentConfig;
use db_agent_config::DbDriver;
use db_agent_core::Effect;
use db_agent_core::ExecuteMode;
use db_agent_core::ExecuteRequest;
use db_agent_core::Grant;
use db_agent_core::GrantId;
use db_agent_core::GrantScope;
use db_agent_core::GrantStore;
use db_agent_core::IdempotencyStore;
use db_agent_core::Operation;
use db_agent_core::ReceiptService;
use db_agent_core::ReplayGuard;
use db_agent_core::ScopeType;
use db_agent_core::SharedAdapter;
use db_agent_core::SharedClock;
use db_agent_core::SystemClock;
use db_agent_core::TaskStore;
use db_agent_core::TemplateRegistry;
use db_agent_core::TenantId;
use db_agent_core::Timestamp;
use db_agent_core::WalletAddress;
use db_agent_store_postgres::PostgresAdapter;
use db_agent_store_postgres::PostgresAdapterConfig;
use db_agent_store_sqlite::SqliteAdapter;
use db_agent_store_sqlite::SqliteAdapterConfig;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::a2a::TaskWork;
use crate::a2a::spawn_workers;
use crate::audit::AdapterAuditSink;
use crate::audit::NoopAuditSink;
use crate::audit::SharedAuditSink;
use crate::drafts::AiStore;
use crate::metrics::InMemoryMetrics;
use crate::metrics::Metrics;
use crate::schema_registry::TenantSchemaRegistry;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Application construction failures.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration is invalid for the selected mode.
    #[error("configuration error: {0}")]
    Config(String),
    /// A service failed to initialize.
    #[error("initialization error: {0}")]
    Init(String),
}

// ============================================================================
// SECTION: Application
// ============================================================================

/// Fully wired agent application.
///
/// # Invariants
/// - Constructed once; all shared state is owned here and reached by `Arc`.
pub struct Application {
    /// Validated configuration.
    pub config: AgentConfig,
    /// Database adapter.
    pub adapter: SharedAdapter,
    /// Injectable clock.
    pub clock: SharedClock,
    /// Request authenticator.
    pub authenticator: Authenticator,
    /// Grant store.
    pub grants: GrantStore,
    /// Template registry.
    pub templates: TemplateRegistry,
    /// Tenant schema registry.
    pub schemas: TenantSchemaRegistry,
    /// AI draft and approval store.
    pub ai: AiStore,
    /// Receipt service.
    pub receipts: ReceiptService,
    /// Audit sink.
    pub audit: SharedAuditSink,
    /// Metrics sink.
    pub metrics: Arc<dyn Metrics>,
    /// Task store.
    pub tasks: TaskStore,
    /// Idempotency store.
    pub idempotency: IdempotencyStore,
    /// Per-agent allowed task types.
    pub a2a_task_types: BTreeMap<String, BTreeSet<String>>,
    /// Background task queue sender (set once at startup).
    queue: OnceLock<mpsc::Sender<TaskWork>>,
}

impl Application {
    /// Builds the application from configuration, opening the configured
    /// database backend.
    ///
    /// # Errors
    ///
    /// Returns [`AppError`] when the adapter or any service fails to
    /// initialize.
    pub async fn from_config(config: AgentConfig) -> Result<Arc<Self>, AppError> {
        let adapter: SharedAdapter = match config.database.driver {
            DbDriver::Sqlite => {
                let adapter = SqliteAdapter::open(&SqliteAdapterConfig::for_path(
                    &config.database.sqlite_file_path,
                ))
                .map_err(|err| AppError::Init(err.to_string()))?;
                Arc::new(adapter)
            }
            DbDriver::Postgres => {
                let url = config
                    .database
                    .url
                    .clone()
                    .ok_or_else(|| AppError::Config("DATABASE_URL is required".to_string()))?;
                let adapter = PostgresAdapter::connect(&PostgresAdapterConfig {
                    url,
                    max_pool_size: config.database.postgres_max_pool_size,
                    ssl: config.database.postgres_ssl,
                })
                .await
                .map_err(|err| AppError::Init(err.to_string()))?;
                Arc::new(adapter)
            }
        };
        Self::with_parts(config, adapter, Arc::new(SystemClock)).await
    }

    /// Builds the application over an existing adapter and clock.
    ///
    /// # Errors
    ///
    /// Returns [`AppError`] when a service fails to initialize.
    pub async fn with_parts(
        config: AgentConfig,
        adapter: SharedAdapter,
        clock: SharedClock,
    ) -> Result<Arc<Self>, AppError> {
        let replay = Arc::new(ReplayGuard::new(config.replay_config()));
        let (registry, a2a_task_types) = build_signer_registry(&config)?;
        let authenticator =
            Authenticator::new(config.auth.enabled, Arc::clone(&replay), Arc::clone(&clock), registry);
        let receipts = ReceiptService::new(
            config.proof.enabled,
            config.service.name.clone(),
            config.runtime_claims(),
            adapter.dialect(),
        )
        .map_err(|err| AppError::Init(err.to_string()))?;
        let audit: SharedAuditSink = if config.limits.audit_enabled {
            Arc::new(AdapterAuditSink::new(Arc::clone(&adapter)))
        } else {
            Arc::new(NoopAuditSink)
        };
        let idempotency = IdempotencyStore::new(config.idempotency_config());
        let app = Arc::new(Self {
            config,
            adapter,
            clock,
            authenticator,
            grants: GrantStore::new(),
            templates: TemplateRegistry::canonical_defaults(),
            schemas: TenantSchemaRegistry::new(),
            ai: AiStore::new(),
            receipts,
            audit,
            metrics: Arc::new(InMemoryMetrics::new()),
            tasks: TaskStore::new(),
            idempotency,
            a2a_task_types,
            queue: OnceLock::new(),
        });
        app.hydrate_grants().await;
        app.start_background();
        Ok(app)
    }

    /// Starts the worker pool and the store sweepers.
    fn start_background(self: &Arc<Self>) {
        let (sender, receiver) = mpsc::channel(self.config.a2a.queue_capacity);
        let _ = self.queue.set(sender);
        spawn_workers(Arc::clone(self), receiver);

        let app = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(30));
            loop {
                ticker.tick().await;
                let now = app.clock.now();
                app.authenticator.replay_guard().sweep(&now);
                app.idempotency.sweep(&now);
            }
        });
    }

    /// Enqueues background work, returning the item when the queue is full.
    ///
    /// # Errors
    ///
    /// Returns the rejected work item when the queue is saturated or the
    /// pool has shut down.
    pub fn enqueue(&self, work: TaskWork) -> Result<(), TaskWork> {
        let Some(sender) = self.queue.get() else {
            return Err(work);
        };
        sender.try_send(work).map_err(|err| match err {
            mpsc::error::TrySendError::Full(work)
            | mpsc::error::TrySendError::Closed(work) => work,
        })
    }

    /// Returns the runtime claims snapshot for the attestation endpoint.
    #[must_use]
    pub fn runtime_snapshot(&self) -> Value {
        let verification = self.receipts.verification();
        json!({
            "service": verification.service,
            "runtime": verification.runtime,
            "databaseDialect": verification.database_dialect,
        })
    }

    /// Loads persisted grants from the backing store into memory.
    ///
    /// Best-effort: a fresh database simply has no rows yet.
    async fn hydrate_grants(&self) {
        let sql = "SELECT grant_id, tenant_id, wallet_address, scope_type, scope_id, operation, \
                   effect, issued_by, issued_at, signature_hash FROM policy_grants";
        let Ok(outcome) = self
            .adapter
            .execute(ExecuteRequest {
                mode: ExecuteMode::Read,
                sql: sql.to_string(),
                params: Vec::new(),
            })
            .await
        else {
            return;
        };
        for row in outcome.rows {
            if let Some(grant) = grant_from_row(&row) {
                let _ = self.grants.insert(grant);
            }
        }
    }
}

// ============================================================================
// SECTION: Wiring Helpers
// ============================================================================

/// Builds the peer-agent signer registry and task-type allowlists.
fn build_signer_registry(
    config: &AgentConfig,
) -> Result<(AgentSignerRegistry, BTreeMap<String, BTreeSet<String>>), AppError> {
    let mut registry = AgentSignerRegistry::new();
    let mut task_types = BTreeMap::new();
    for (agent_id, entry) in &config.a2a.signers {
        let scheme = match entry.scheme.as_str() {
            "hmac-sha256" => AgentSignerScheme::HmacSha256 {
                shared_secret: entry.shared_secret.clone().unwrap_or_default(),
            },
            "evm-personal-sign" => {
                let raw = entry.signer.clone().unwrap_or_default();
                let signer = WalletAddress::parse(&raw).map_err(|err| {
                    AppError::Config(format!("agent {agent_id} signer invalid: {err}"))
                })?;
                AgentSignerScheme::EvmPersonalSign {
                    signer,
                }
            }
            other => {
                return Err(AppError::Config(format!(
                    "agent {agent_id} has unknown scheme: {other}"
                )));
            }
        };
        registry.register(agent_id.clone(), scheme);
        task_types
            .insert(agent_id.clone(), BTreeSet::from(["query.execute".to_string()]));
    }
    Ok((registry, task_types))
}

/// Rebuilds a grant from a persisted row.
fn grant_from_row(row: &serde_json::Map<String, Value>) -> Option<Grant> {
    let text = |field: &str| row.get(field).and_then(Value::as_str);
    let scope_type = match text("scope_type")? {
        "database" => ScopeType::Database,
        "table" => ScopeType::Table,
        _ => return None,
    };
    let operation = match text("operation")? {
        "read" => Operation::Read,
        "insert" => Operation::Insert,
        "update" => Operation::Update,
        "delete" => Operation::Delete,
        "alter" => Operation::Alter,
        "all" => Operation::All,
        _ => return None,
    };
    let effect = match text("effect")? {
        "allow" => Effect::Allow,
        "deny" => Effect::Deny,
        _ => return None,
    };
    Some(Grant {
        grant_id: GrantId::parse(text("grant_id")?)?,
        tenant_id: TenantId::parse(text("tenant_id")?).ok()?,
        wallet_address: WalletAddress::parse(text("wallet_address")?).ok()?,
        scope: GrantScope {
            scope_type,
            scope_id: text("scope_id")?.to_string(),
        },
        operation,
        effect,
        issued_by: WalletAddress::parse(text("issued_by")?).ok()?,
        issued_at: Timestamp::parse(text("issued_at")?).ok()?,
        signature_hash: text("signature_hash")?.to_string(),
    })
}
