// crates/toolgate-core/tests/common/mod.rs
// ============================================================================
// Module: Common Test Fixtures
// Description: Shared control-plane harness and tool bodies for core tests.
// Purpose: Assemble a fully wired executor over in-memory stores.
// Dependencies: toolgate-core
// ============================================================================

//! ## Overview
//! The harness wires every runtime component over in-memory stores and a
//! manual clock, so tests can inspect audit entries, grants, and breaker
//! state directly after driving the executor.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use serde_json::Value;
use serde_json::json;
use toolgate_core::ApprovalDecision;
use toolgate_core::AuditEntry;
use toolgate_core::AuditEventType;
use toolgate_core::AuditKey;
use toolgate_core::AuditLog;
use toolgate_core::AuditRange;
use toolgate_core::AuditStore;
use toolgate_core::CircuitBreakerRegistry;
use toolgate_core::ConfirmationApprover;
use toolgate_core::ConfirmationGate;
use toolgate_core::ControlPlaneSettings;
use toolgate_core::DegradationManager;
use toolgate_core::ExecutorComponents;
use toolgate_core::GrantRequest;
use toolgate_core::InMemoryAuditStore;
use toolgate_core::InMemoryGrantStore;
use toolgate_core::InMemoryToolCatalog;
use toolgate_core::ManualClock;
use toolgate_core::NoopEventSink;
use toolgate_core::PendingConfirmation;
use toolgate_core::Timestamp;
use toolgate_core::ToolAuthority;
use toolgate_core::ToolBody;
use toolgate_core::ToolDescriptor;
use toolgate_core::ToolExecutor;
use toolgate_core::ToolFault;
use toolgate_core::TurnId;

// ============================================================================
// SECTION: Keys and Clocks
// ============================================================================

/// Returns a deterministic 32-byte audit key.
pub fn test_key() -> AuditKey {
    AuditKey::new(vec![0x5a; 32]).expect("test key")
}

/// Returns a manual clock at a fixed epoch.
pub fn test_clock() -> ManualClock {
    ManualClock::starting_at(Timestamp::from_unix_millis(1_700_000_000_000))
}

/// Parses a turn identifier.
pub fn turn(id: &str) -> TurnId {
    TurnId::parse(id).expect("turn id")
}

// ============================================================================
// SECTION: Tool Bodies
// ============================================================================

/// Tool that returns a fixed value and counts invocations.
pub struct EchoTool {
    /// Output returned on every call.
    pub output: Value,
    /// Invocation count.
    pub calls: AtomicU32,
}

impl EchoTool {
    /// Creates an echo tool.
    pub fn new(output: Value) -> Arc<Self> {
        Arc::new(Self {
            output,
            calls: AtomicU32::new(0),
        })
    }

    /// Returns the invocation count.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolBody for EchoTool {
    async fn invoke(&self, _params: Value) -> Result<Value, ToolFault> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.output.clone())
    }
}

/// Tool that always fails and counts invocations.
pub struct FailingTool {
    /// Builds the fault for each call.
    pub fault: fn() -> ToolFault,
    /// Fallback output, when the tool supports degradation.
    pub fallback: Option<Value>,
    /// Invocation count.
    pub calls: AtomicU32,
}

impl FailingTool {
    /// Creates a tool failing with a generic execution fault.
    pub fn new() -> Arc<Self> {
        Self::with_fault(|| ToolFault::Failed("backend unavailable".to_string()))
    }

    /// Creates a tool failing with the given fault.
    pub fn with_fault(fault: fn() -> ToolFault) -> Arc<Self> {
        Arc::new(Self {
            fault,
            fallback: None,
            calls: AtomicU32::new(0),
        })
    }

    /// Creates a failing tool with a degraded fallback.
    pub fn with_fallback(fallback: Value) -> Arc<Self> {
        Arc::new(Self {
            fault: || ToolFault::Network("upstream reset".to_string()),
            fallback: Some(fallback),
            calls: AtomicU32::new(0),
        })
    }

    /// Returns the invocation count.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolBody for FailingTool {
    async fn invoke(&self, _params: Value) -> Result<Value, ToolFault> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err((self.fault)())
    }

    fn degraded(&self, _params: &Value) -> Option<Value> {
        self.fallback.clone()
    }
}

/// Tool that never completes.
pub struct HangingTool;

#[async_trait]
impl ToolBody for HangingTool {
    async fn invoke(&self, _params: Value) -> Result<Value, ToolFault> {
        std::future::pending::<()>().await;
        Ok(json!(null))
    }
}

/// Tool that panics.
pub struct PanickingTool;

#[async_trait]
impl ToolBody for PanickingTool {
    async fn invoke(&self, _params: Value) -> Result<Value, ToolFault> {
        panic!("tool body bug");
    }
}

// ============================================================================
// SECTION: Approvers
// ============================================================================

/// Approver that never answers.
pub struct SilentApprover;

#[async_trait]
impl ConfirmationApprover for SilentApprover {
    async fn decide(&self, _request: &PendingConfirmation) -> ApprovalDecision {
        std::future::pending::<ApprovalDecision>().await
    }
}

// ============================================================================
// SECTION: Harness
// ============================================================================

/// Fully wired control plane over in-memory stores.
pub struct Harness {
    /// Shared manual clock.
    pub clock: ManualClock,
    /// Audit entry store.
    pub audit_store: InMemoryAuditStore,
    /// Grant store.
    pub grant_store: InMemoryGrantStore,
    /// Audit log.
    pub audit: Arc<AuditLog>,
    /// Tool authority.
    pub authority: Arc<ToolAuthority>,
    /// Breaker registry.
    pub breakers: Arc<CircuitBreakerRegistry>,
    /// Degradation manager.
    pub governor: Arc<DegradationManager>,
    /// Confirmation gate.
    pub gate: Arc<ConfirmationGate>,
    /// Tool catalog.
    pub catalog: Arc<InMemoryToolCatalog>,
    /// Executor under test.
    pub executor: ToolExecutor,
}

impl Harness {
    /// Builds a harness.
    pub fn new(
        settings: &ControlPlaneSettings,
        grants: &[GrantRequest],
        approver: Arc<dyn ConfirmationApprover>,
    ) -> Self {
        settings.validate().expect("valid settings");
        let clock = test_clock();
        let audit_store = InMemoryAuditStore::new();
        let grant_store = InMemoryGrantStore::new();
        let audit = Arc::new(
            AuditLog::open(
                Arc::new(audit_store.clone()),
                Arc::new(test_key()),
                Arc::new(clock.clone()),
            )
            .expect("audit log"),
        );
        let authority = Arc::new(
            ToolAuthority::new(
                settings.authority.clone(),
                grants,
                Arc::new(grant_store.clone()),
                Arc::clone(&audit),
                Arc::new(clock.clone()),
            )
            .expect("authority"),
        );
        let breakers = Arc::new(CircuitBreakerRegistry::new(
            settings.breaker.clone(),
            Arc::new(clock.clone()),
        ));
        let governor = Arc::new(DegradationManager::new(
            settings.budget,
            settings.retry,
            &settings.policy_overrides,
        ));
        let gate = Arc::new(ConfirmationGate::new(
            approver,
            Arc::clone(&authority),
            Arc::clone(&audit),
            Arc::new(clock.clone()),
            settings.confirmation_timeout,
        ));
        let catalog = Arc::new(InMemoryToolCatalog::new());
        let executor = ToolExecutor::new(ExecutorComponents {
            catalog: catalog.clone(),
            breakers: Arc::clone(&breakers),
            authority: Arc::clone(&authority),
            gate: Arc::clone(&gate),
            governor: Arc::clone(&governor),
            audit: Arc::clone(&audit),
            clock: Arc::new(clock.clone()),
            sink: Arc::new(NoopEventSink),
            default_tool_timeout: settings.default_tool_timeout,
        });
        Self {
            clock,
            audit_store,
            grant_store,
            audit,
            authority,
            breakers,
            governor,
            gate,
            catalog,
            executor,
        }
    }

    /// Registers a tool.
    pub fn register(&self, descriptor: ToolDescriptor, body: Arc<dyn ToolBody>) {
        self.catalog.register(descriptor, body).expect("register tool");
    }

    /// Returns every audit entry.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.audit_store.read_range(1, None, usize::MAX).expect("read entries")
    }

    /// Returns audit entries of one type.
    pub fn entries_of(&self, event_type: AuditEventType) -> Vec<AuditEntry> {
        self.entries().into_iter().filter(|entry| entry.event_type == event_type).collect()
    }

    /// Exports the whole chain.
    pub fn export(&self) -> Vec<u8> {
        self.audit.export_for_review(AuditRange::ALL).expect("export")
    }
}
