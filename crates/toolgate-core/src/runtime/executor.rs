// crates/toolgate-core/src/runtime/executor.rs
// ============================================================================
// Module: Toolgate Tool Executor
// Description: Fixed per-call pipeline from admission to classified outcome.
// Purpose: Mediate every tool invocation requested by the planner.
// Dependencies: crate::core, crate::interfaces, crate::runtime, tokio
// ============================================================================

//! ## Overview
//! [`ToolExecutor::execute`] runs one call through a fixed pipeline:
//! parameter validation, circuit breaker admission, the turn's budget and
//! dependency gate, authority (with confirmation when required), then the
//! tool body on its own task under a timeout. Every stage records its
//! outcome in the audit log.
//!
//! The result distinguishes "this call failed" ([`ExecutionResult::Failed`])
//! from "this turn is over" ([`AbortSignal`]). Rejections before the tool
//! body runs (validation, circuit open, permission) do not spend the turn's
//! failure budget. A call that recovers on retry spends none of it either; a
//! call whose failure is final spends exactly one unit. Breaker attempts are
//! counted per invocation.
//!
//! Collaborators are injected through [`ExecutorComponents`]; the executor
//! owns no process-wide state.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use crate::core::AuditActor;
use crate::core::AuditDraft;
use crate::core::AuditEntry;
use crate::core::AuditEventType;
use crate::core::AuditRange;
use crate::core::AuthorityDecision;
use crate::core::AuthorityOutcome;
use crate::core::ControlError;
use crate::core::ErrorCategory;
use crate::core::PermissionLevel;
use crate::core::ToolCall;
use crate::core::ToolName;
use crate::core::TurnId;
use crate::core::VerifyResult;
use crate::interfaces::Clock;
use crate::interfaces::ResolvedTool;
use crate::interfaces::ToolCatalog;
use crate::runtime::audit_log::AuditError;
use crate::runtime::audit_log::AuditLog;
use crate::runtime::authority::ToolAuthority;
use crate::runtime::breaker::Admission;
use crate::runtime::breaker::BreakerTransition;
use crate::runtime::breaker::CircuitBreakerRegistry;
use crate::runtime::classifier::classify;
use crate::runtime::classifier::classify_join_failure;
use crate::runtime::classifier::classify_timeout;
use crate::runtime::confirmation::ConfirmationGate;
use crate::runtime::confirmation::ConfirmationRequest;
use crate::runtime::degradation::AbortReason;
use crate::runtime::degradation::DegradationManager;
use crate::runtime::degradation::DispatchGate;
use crate::runtime::degradation::FailureContext;
use crate::runtime::degradation::FailureDisposition;
use crate::runtime::degradation::Remediation;
use crate::runtime::degradation::TurnSummary;
use crate::runtime::telemetry::ControlEvent;
use crate::runtime::telemetry::ControlEventSink;
use crate::runtime::telemetry::HealthSnapshot;
use crate::runtime::telemetry::ToolStatus;

// ============================================================================
// SECTION: Results
// ============================================================================

/// Outcome of a call whose turn continues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionResult {
    /// The tool returned a result.
    Succeeded {
        /// Tool output.
        output: Value,
        /// Invocation attempts, including retries.
        attempts: u32,
    },
    /// The tool failed and its fallback result was substituted.
    Degraded {
        /// Fallback output.
        output: Value,
        /// Failure that triggered the fallback.
        error: ControlError,
    },
    /// The call failed or was rejected.
    Failed {
        /// Classified error.
        error: ControlError,
        /// Remediation applied, when the failure reached the degradation policy.
        remediation: Option<Remediation>,
    },
}

impl ExecutionResult {
    /// Returns the classified error, when the call did not succeed cleanly.
    #[must_use]
    pub const fn error(&self) -> Option<&ControlError> {
        match self {
            Self::Succeeded {
                ..
            } => None,
            Self::Degraded {
                error, ..
            }
            | Self::Failed {
                error, ..
            } => Some(error),
        }
    }
}

/// Signal that the turn is over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AbortSignal {
    /// Aborted turn.
    pub turn_id: TurnId,
    /// Call that observed the abort.
    pub tool: ToolName,
    /// Why the turn ended.
    pub reason: AbortReason,
    /// Error that triggered the abort, when one did.
    pub error: Option<ControlError>,
    /// What succeeded and what failed before the abort.
    pub summary: TurnSummary,
}

impl AbortSignal {
    /// Renders the user-facing account of the aborted turn.
    #[must_use]
    pub fn user_message(&self) -> String {
        let mut message = format!("Stopped: {}.", self.reason.describe());
        if !self.summary.succeeded.is_empty() {
            let done: Vec<&str> = self.summary.succeeded.iter().map(ToolName::as_str).collect();
            let _ = write!(message, " Completed: {}.", done.join(", "));
        }
        for step in &self.summary.failed {
            let _ = write!(message, " {} failed ({}): {}.", step.tool, step.category, step.message);
        }
        if !self.summary.skipped.is_empty() {
            let skipped: Vec<&str> = self.summary.skipped.iter().map(ToolName::as_str).collect();
            let _ = write!(message, " Skipped: {}.", skipped.join(", "));
        }
        message
    }
}

impl fmt::Display for AbortSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "turn {} aborted: {}", self.turn_id, self.reason.describe())
    }
}

impl std::error::Error for AbortSignal {}

/// Internal pipeline result.
enum Flow {
    /// The call finished; the turn continues.
    Done(ExecutionResult),
    /// The turn is over.
    Abort {
        /// Abort reason.
        reason: AbortReason,
        /// Triggering error.
        error: Option<ControlError>,
    },
}

/// What happens after a failed attempt.
enum Settlement {
    /// Re-attempt after `delay`.
    Retry {
        /// Retry number, starting at 1.
        attempt: u32,
        /// Delay before the re-attempt.
        delay: Duration,
    },
    /// The call is finished.
    Final(Flow),
}

/// Result of the authority stage.
enum Authorization {
    /// The call may proceed.
    Granted,
    /// The call was refused.
    Refused(ControlError),
}

/// Maps an infrastructure fault to the internal category.
fn internal(error: impl fmt::Display) -> ControlError {
    ControlError::internal(error.to_string())
}

/// Converts a duration to whole milliseconds.
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// SECTION: Executor
// ============================================================================

/// Collaborators of a [`ToolExecutor`].
pub struct ExecutorComponents {
    /// Tool registry.
    pub catalog: Arc<dyn ToolCatalog>,
    /// Circuit breakers.
    pub breakers: Arc<CircuitBreakerRegistry>,
    /// Permission authority.
    pub authority: Arc<ToolAuthority>,
    /// Confirmation gate.
    pub gate: Arc<ConfirmationGate>,
    /// Failure budgets and remediation policy.
    pub governor: Arc<DegradationManager>,
    /// Audit log.
    pub audit: Arc<AuditLog>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Telemetry sink.
    pub sink: Arc<dyn ControlEventSink>,
    /// Timeout for tools that do not declare one.
    pub default_tool_timeout: Duration,
}

/// Tool executor mediating every planner-requested call.
pub struct ToolExecutor {
    /// Tool registry.
    catalog: Arc<dyn ToolCatalog>,
    /// Circuit breakers.
    breakers: Arc<CircuitBreakerRegistry>,
    /// Permission authority.
    authority: Arc<ToolAuthority>,
    /// Confirmation gate.
    gate: Arc<ConfirmationGate>,
    /// Failure budgets and remediation policy.
    governor: Arc<DegradationManager>,
    /// Audit log.
    audit: Arc<AuditLog>,
    /// Time source.
    clock: Arc<dyn Clock>,
    /// Telemetry sink.
    sink: Arc<dyn ControlEventSink>,
    /// Timeout for tools that do not declare one.
    default_tool_timeout: Duration,
}

impl ToolExecutor {
    /// Creates an executor from its collaborators.
    #[must_use]
    pub fn new(components: ExecutorComponents) -> Self {
        Self {
            catalog: components.catalog,
            breakers: components.breakers,
            authority: components.authority,
            gate: components.gate,
            governor: components.governor,
            audit: components.audit,
            clock: components.clock,
            sink: components.sink,
            default_tool_timeout: components.default_tool_timeout,
        }
    }

    /// Executes a call within a turn.
    ///
    /// # Errors
    ///
    /// Returns [`AbortSignal`] when the turn is over: the budget is spent, a
    /// dependency failed, policy selected fail-fast, or the control plane
    /// itself failed.
    pub async fn execute(
        &self,
        call: ToolCall,
        turn_id: &TurnId,
    ) -> Result<ExecutionResult, AbortSignal> {
        let started = self.clock.now();
        let mut attempts = 0;
        let flow = match self.run_pipeline(&call, turn_id, &mut attempts).await {
            Ok(flow) => flow,
            Err(error) => self.internal_abort(turn_id, &call.tool, error),
        };
        let elapsed_ms = millis(self.clock.now().duration_since(started));
        let (status, category) = match &flow {
            Flow::Done(ExecutionResult::Succeeded {
                ..
            }) => (ToolStatus::Succeeded, None),
            Flow::Done(ExecutionResult::Degraded {
                error, ..
            }) => (ToolStatus::Degraded, Some(error.category)),
            Flow::Done(ExecutionResult::Failed {
                error, ..
            }) => (ToolStatus::Failed, Some(error.category)),
            Flow::Abort {
                error, ..
            } => (ToolStatus::Aborted, error.as_ref().map(|error| error.category)),
        };
        self.emit(ControlEvent::ToolCompleted {
            turn_id: turn_id.clone(),
            tool: call.tool.clone(),
            status,
            category,
            attempts,
            elapsed_ms,
        });
        match flow {
            Flow::Done(result) => Ok(result),
            Flow::Abort {
                reason,
                error,
            } => Err(self.abort_signal(turn_id, call.tool, reason, error)),
        }
    }

    /// Executes a call whose turn identifier comes from an untrusted caller.
    ///
    /// A missing or empty identifier is rejected before any side effect,
    /// including audit entries.
    ///
    /// # Errors
    ///
    /// Returns [`AbortSignal`] under the same conditions as [`Self::execute`].
    pub async fn execute_request(
        &self,
        call: ToolCall,
        turn_id: Option<&str>,
    ) -> Result<ExecutionResult, AbortSignal> {
        match TurnId::from_optional(turn_id) {
            Ok(turn_id) => self.execute(call, &turn_id).await,
            Err(err) => Ok(ExecutionResult::Failed {
                error: ControlError::validation(&call.tool, err.to_string()),
                remediation: None,
            }),
        }
    }

    /// Runs the authority check on its own, recording the decision.
    ///
    /// # Errors
    ///
    /// Returns an internal [`ControlError`] when the decision cannot be recorded.
    pub fn check_authority(
        &self,
        tool: &ToolName,
        params: &Value,
        level: PermissionLevel,
        turn_id: &TurnId,
    ) -> Result<AuthorityDecision, ControlError> {
        let decision = self.authority.check(tool, params, level, turn_id).map_err(internal)?;
        self.emit_decision(&decision);
        Ok(decision)
    }

    /// Appends an event to the audit log.
    ///
    /// # Errors
    ///
    /// Returns an internal [`ControlError`] when the append fails.
    pub fn audit_event(&self, draft: AuditDraft) -> Result<AuditEntry, ControlError> {
        self.audit.append(draft).map_err(internal)
    }

    /// Verifies the audit chain.
    ///
    /// # Errors
    ///
    /// Returns an internal [`ControlError`] when entries cannot be read.
    pub fn verify_chain(&self) -> Result<VerifyResult, ControlError> {
        self.audit.verify_chain().map_err(internal)
    }

    /// Exports a chain segment as a canonical JSON review bundle.
    ///
    /// # Errors
    ///
    /// Returns a validation [`ControlError`] for an invalid range, or an
    /// internal one when entries cannot be read.
    pub fn export_for_review(&self, range: AuditRange) -> Result<Vec<u8>, ControlError> {
        self.audit.export_for_review(range).map_err(|err| match err {
            AuditError::InvalidRange(_) => {
                ControlError::new(ErrorCategory::Validation, err.to_string())
            }
            other => internal(other),
        })
    }

    /// Closes a turn, releasing pending confirmations, and returns its summary.
    ///
    /// # Errors
    ///
    /// Returns an internal [`ControlError`] when the closure cannot be recorded.
    pub fn end_turn(&self, turn_id: &TurnId) -> Result<TurnSummary, ControlError> {
        let summary = self
            .governor
            .end_turn(turn_id)
            .map_err(internal)?
            .unwrap_or_else(|| TurnSummary {
                turn_id: turn_id.clone(),
                succeeded: Vec::new(),
                failed: Vec::new(),
                skipped: Vec::new(),
                degraded: Vec::new(),
                aborted: None,
                total_failures: 0,
                consecutive_failures: 0,
            });
        self.audit
            .append(AuditDraft::for_turn(
                turn_id,
                AuditEventType::TurnLifecycle,
                AuditActor::Governor,
                json!({
                    "action": "closed",
                    "succeeded": summary.succeeded,
                    "failed": summary.failed.iter().map(|step| &step.tool).collect::<Vec<_>>(),
                    "skipped": summary.skipped,
                    "degraded": summary.degraded,
                    "aborted": summary.aborted.is_some(),
                }),
            ))
            .map_err(internal)?;
        self.emit(ControlEvent::TurnClosed {
            turn_id: turn_id.clone(),
            succeeded: summary.succeeded.len(),
            failed: summary.failed.len(),
            aborted: summary.aborted.is_some(),
        });
        Ok(summary)
    }

    /// Returns a passive health readout.
    ///
    /// # Errors
    ///
    /// Returns an internal [`ControlError`] when state cannot be read.
    pub fn health(&self) -> Result<HealthSnapshot, ControlError> {
        Ok(HealthSnapshot {
            at: self.clock.now(),
            breakers: self.breakers.snapshot().map_err(internal)?,
            open_circuits: self.breakers.open_circuits().map_err(internal)?,
            turns: self.governor.snapshot().map_err(internal)?,
            audit: self.audit.stats().map_err(internal)?,
        })
    }

    /// Closes a tool's breaker on operator request.
    ///
    /// # Errors
    ///
    /// Returns an internal [`ControlError`] when the reset cannot be recorded.
    pub fn reset_breaker(&self, tool: &ToolName) -> Result<(), ControlError> {
        if let Some(transition) = self.breakers.reset(tool).map_err(internal)? {
            self.record_transition(None, &transition, AuditActor::Operator)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Pipeline
    // ------------------------------------------------------------------------

    /// Runs the pipeline. `Err` carries an infrastructure fault.
    async fn run_pipeline(
        &self,
        call: &ToolCall,
        turn_id: &TurnId,
        attempts: &mut u32,
    ) -> Result<Flow, ControlError> {
        let tool = &call.tool;
        let resolved = match self.resolve(call) {
            Ok(resolved) => resolved,
            Err(error) => {
                self.record_rejection(turn_id, tool, "validation", &error)?;
                return Ok(Flow::Done(ExecutionResult::Failed {
                    error,
                    remediation: None,
                }));
            }
        };
        let level = resolved.descriptor.level;
        let mut retries_used = 0;
        let mut authorized = false;
        loop {
            if let Some(reason) = self.governor.aborted(turn_id).map_err(internal)? {
                return self.reject_aborted(turn_id, tool, reason);
            }
            let admission = self.breakers.attempt(tool).map_err(internal)?;
            if let Some(transition) = &admission.transition {
                self.record_transition(Some(turn_id), transition, AuditActor::Breaker)?;
            }
            if let Admission::Rejected(error) = admission.admission {
                self.record_rejection(turn_id, tool, "circuit_breaker", &error)?;
                if retries_used == 0 {
                    return Ok(Flow::Done(ExecutionResult::Failed {
                        error,
                        remediation: None,
                    }));
                }
                // The call already ran and failed; its failure still settles.
                match self.settle_failure(&resolved, call, turn_id, error, retries_used, *attempts)? {
                    Settlement::Retry {
                        attempt,
                        delay,
                    } => {
                        retries_used = attempt;
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    Settlement::Final(flow) => return Ok(flow),
                }
            }

            match self.governor.gate_dispatch(turn_id, call).map_err(internal)? {
                DispatchGate::Proceed => {}
                DispatchGate::TurnAborted(reason) => {
                    return self.reject_aborted(turn_id, tool, reason);
                }
                DispatchGate::DependencyUnavailable(reason) => {
                    let error = ControlError::new(ErrorCategory::Validation, reason.describe())
                        .with_tool(tool);
                    self.record_rejection(turn_id, tool, "dependency", &error)?;
                    self.record_abort(turn_id, tool, &reason)?;
                    return Ok(Flow::Abort {
                        reason,
                        error: Some(error),
                    });
                }
            }

            if !authorized {
                match self.authorize(call, level, turn_id).await? {
                    Authorization::Granted => authorized = true,
                    Authorization::Refused(error) => {
                        self.record_rejection(turn_id, tool, "authority", &error)?;
                        return Ok(Flow::Done(ExecutionResult::Failed {
                            error,
                            remediation: None,
                        }));
                    }
                }
            }

            *attempts = attempts.saturating_add(1);
            let error = match self.invoke(&resolved, call).await {
                Ok(output) => {
                    if let Some(transition) = self.breakers.record_success(tool).map_err(internal)? {
                        self.record_transition(Some(turn_id), &transition, AuditActor::Breaker)?;
                    }
                    self.governor.on_success(turn_id, tool).map_err(internal)?;
                    self.record_execution(turn_id, json!({
                        "tool": tool,
                        "status": "succeeded",
                        "attempt": *attempts,
                    }))?;
                    return Ok(Flow::Done(ExecutionResult::Succeeded {
                        output,
                        attempts: *attempts,
                    }));
                }
                Err(error) => error,
            };

            if let Some(transition) = self.breakers.record_failure(tool).map_err(internal)? {
                self.record_transition(Some(turn_id), &transition, AuditActor::Breaker)?;
            }
            match self.settle_failure(&resolved, call, turn_id, error, retries_used, *attempts)? {
                Settlement::Retry {
                    attempt,
                    delay,
                } => {
                    retries_used = attempt;
                    tokio::time::sleep(delay).await;
                }
                Settlement::Final(flow) => return Ok(flow),
            }
        }
    }

    /// Hands a failed attempt to the degradation policy and applies the result.
    fn settle_failure(
        &self,
        resolved: &ResolvedTool,
        call: &ToolCall,
        turn_id: &TurnId,
        error: ControlError,
        retries_used: u32,
        attempts: u32,
    ) -> Result<Settlement, ControlError> {
        let tool = &call.tool;
        let disposition = self
            .governor
            .on_failure(FailureContext {
                turn_id,
                tool,
                level: resolved.descriptor.level,
                error: &error,
                is_dependency: call.is_dependency,
                retries_used,
            })
            .map_err(internal)?;
        self.record_execution(turn_id, json!({
            "tool": tool,
            "status": "failed",
            "attempt": attempts,
            "category": error.category,
            "message": error.message,
            "disposition": disposition_label(&disposition),
        }))?;
        let flow = match disposition {
            FailureDisposition::Continue(Remediation::Retry {
                attempt,
                delay,
            }) => {
                return Ok(Settlement::Retry {
                    attempt,
                    delay,
                });
            }
            FailureDisposition::Continue(Remediation::Skip) => Flow::Done(ExecutionResult::Failed {
                error,
                remediation: Some(Remediation::Skip),
            }),
            FailureDisposition::Continue(Remediation::Degrade) => {
                self.degrade(resolved, call, turn_id, error)?
            }
            FailureDisposition::AbortTurn(reason) => {
                self.record_abort(turn_id, tool, &reason)?;
                Flow::Abort {
                    reason,
                    error: Some(error),
                }
            }
        };
        Ok(Settlement::Final(flow))
    }

    /// Refuses a call because its turn has already aborted.
    fn reject_aborted(
        &self,
        turn_id: &TurnId,
        tool: &ToolName,
        reason: AbortReason,
    ) -> Result<Flow, ControlError> {
        let error = ControlError::budget_exceeded(tool, reason.describe());
        self.record_rejection(turn_id, tool, "turn_budget", &error)?;
        Ok(Flow::Abort {
            reason,
            error: Some(error),
        })
    }

    /// Resolves the tool and validates the call parameters.
    fn resolve(&self, call: &ToolCall) -> Result<ResolvedTool, ControlError> {
        let resolved = self
            .catalog
            .resolve(&call.tool)
            .map_err(|err| ControlError::validation(&call.tool, err.to_string()))?;
        self.catalog
            .validate_params(&call.tool, &call.params)
            .map_err(|err| ControlError::validation(&call.tool, err.to_string()))?;
        Ok(resolved)
    }

    /// Runs the authority stage, suspending on the confirmation gate when required.
    async fn authorize(
        &self,
        call: &ToolCall,
        level: PermissionLevel,
        turn_id: &TurnId,
    ) -> Result<Authorization, ControlError> {
        let decision =
            self.authority.check(&call.tool, &call.params, level, turn_id).map_err(internal)?;
        self.emit_decision(&decision);
        let decision = match decision.outcome {
            AuthorityOutcome::Allow => return Ok(Authorization::Granted),
            AuthorityOutcome::Deny | AuthorityOutcome::ConfirmDenied => decision,
            AuthorityOutcome::ConfirmRequired => {
                let turn_token = self.governor.begin_turn(turn_id).map_err(internal)?;
                let requested_at = self.clock.now();
                let outcome = self
                    .gate
                    .request(
                        ConfirmationRequest {
                            tool: &call.tool,
                            params: &call.params,
                            level,
                            turn_id,
                            timeout: None,
                        },
                        &turn_token,
                    )
                    .await
                    .map_err(internal)?;
                self.emit(ControlEvent::ConfirmationResolved {
                    turn_id: turn_id.clone(),
                    tool: call.tool.clone(),
                    reason: outcome.reason(),
                    waited_ms: millis(self.clock.now().duration_since(requested_at)),
                });
                let decision = self
                    .authority
                    .resolve_confirmation(&call.tool, &call.params, level, turn_id, &outcome)
                    .map_err(internal)?;
                self.emit_decision(&decision);
                if decision.is_allowed() {
                    return Ok(Authorization::Granted);
                }
                decision
            }
        };
        let reason = decision.reason.map_or_else(
            || "no grant authorizes this call".to_string(),
            |reason| {
                serde_json::to_value(reason)
                    .ok()
                    .and_then(|value| value.as_str().map(str::to_string))
                    .unwrap_or_else(|| "denied".to_string())
            },
        );
        Ok(Authorization::Refused(ControlError::permission_denied(
            &call.tool,
            format!("{} denied at level {level}: {reason}", call.tool),
        )))
    }

    /// Invokes the tool body on its own task under the execution timeout.
    ///
    /// A timed-out invocation is abandoned, not aborted.
    async fn invoke(&self, resolved: &ResolvedTool, call: &ToolCall) -> Result<Value, ControlError> {
        let timeout = resolved.descriptor.timeout.unwrap_or(self.default_tool_timeout);
        let body = Arc::clone(&resolved.body);
        let params = call.params.clone();
        let handle = tokio::spawn(async move { body.invoke(params).await });
        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(Ok(output))) => Ok(output),
            Ok(Ok(Err(fault))) => Err(classify(&fault, &call.tool)),
            Ok(Err(join)) => Err(classify_join_failure(&join, &call.tool)),
            Err(_) => Err(classify_timeout(&call.tool, millis(timeout))),
        }
    }

    /// Applies the degrade remediation, falling back to skip.
    fn degrade(
        &self,
        resolved: &ResolvedTool,
        call: &ToolCall,
        turn_id: &TurnId,
        error: ControlError,
    ) -> Result<Flow, ControlError> {
        let Some(output) = resolved.body.degraded(&call.params) else {
            self.governor.on_skip(turn_id, &call.tool).map_err(internal)?;
            return Ok(Flow::Done(ExecutionResult::Failed {
                error,
                remediation: Some(Remediation::Skip),
            }));
        };
        self.governor.on_degraded(turn_id, &call.tool).map_err(internal)?;
        self.record_execution(turn_id, json!({
            "tool": call.tool,
            "status": "degraded",
            "category": error.category,
        }))?;
        Ok(Flow::Done(ExecutionResult::Degraded {
            output,
            error,
        }))
    }

    // ------------------------------------------------------------------------
    // Recording
    // ------------------------------------------------------------------------

    /// Appends a TOOL_EXECUTE entry.
    fn record_execution(&self, turn_id: &TurnId, payload: Value) -> Result<(), ControlError> {
        self.audit
            .append(AuditDraft::for_turn(
                turn_id,
                AuditEventType::ToolExecute,
                AuditActor::Executor,
                payload,
            ))
            .map(|_| ())
            .map_err(internal)
    }

    /// Appends a TOOL_EXECUTE rejection entry.
    fn record_rejection(
        &self,
        turn_id: &TurnId,
        tool: &ToolName,
        stage: &str,
        error: &ControlError,
    ) -> Result<(), ControlError> {
        self.record_execution(turn_id, json!({
            "tool": tool,
            "status": "rejected",
            "stage": stage,
            "category": error.category,
            "message": error.message,
            "retry_after_ms": error.retry_after_ms,
        }))
    }

    /// Appends a CIRCUIT_TRANSITION entry and emits the telemetry event.
    fn record_transition(
        &self,
        turn_id: Option<&TurnId>,
        transition: &BreakerTransition,
        actor: AuditActor,
    ) -> Result<(), ControlError> {
        let payload = json!({
            "tool": transition.tool,
            "from": transition.from,
            "to": transition.to,
            "consecutive_failures": transition.consecutive_failures,
        });
        let draft = match turn_id {
            Some(turn_id) => {
                AuditDraft::for_turn(turn_id, AuditEventType::CircuitTransition, actor, payload)
            }
            None => AuditDraft::detached(AuditEventType::CircuitTransition, actor, payload),
        };
        self.audit.append(draft).map_err(internal)?;
        self.sink.record(transition.at, &ControlEvent::BreakerTransition {
            tool: transition.tool.clone(),
            from: transition.from,
            to: transition.to,
            consecutive_failures: transition.consecutive_failures,
        });
        Ok(())
    }

    /// Appends a TURN_LIFECYCLE abort entry and emits the telemetry event.
    fn record_abort(
        &self,
        turn_id: &TurnId,
        tool: &ToolName,
        reason: &AbortReason,
    ) -> Result<(), ControlError> {
        self.audit
            .append(AuditDraft::for_turn(
                turn_id,
                AuditEventType::TurnLifecycle,
                AuditActor::Governor,
                json!({
                    "action": "aborted",
                    "tool": tool,
                    "reason": reason,
                }),
            ))
            .map_err(internal)?;
        self.emit(ControlEvent::TurnAborted {
            turn_id: turn_id.clone(),
            reason: reason.describe(),
        });
        Ok(())
    }

    /// Aborts the turn after an infrastructure fault.
    ///
    /// The abort entry is best-effort: the fault may be the audit log itself.
    fn internal_abort(&self, turn_id: &TurnId, tool: &ToolName, error: ControlError) -> Flow {
        let reason = AbortReason::FailFast {
            tool: tool.clone(),
            category: ErrorCategory::Internal,
        };
        let reason = self.governor.abort_turn(turn_id, reason.clone()).unwrap_or(reason);
        let _ = self.record_abort(turn_id, tool, &reason);
        Flow::Abort {
            reason,
            error: Some(error.with_tool(tool)),
        }
    }

    /// Builds the abort signal with the turn's current summary.
    fn abort_signal(
        &self,
        turn_id: &TurnId,
        tool: ToolName,
        reason: AbortReason,
        error: Option<ControlError>,
    ) -> AbortSignal {
        let summary = self.governor.summary(turn_id).ok().flatten().unwrap_or_else(|| TurnSummary {
            turn_id: turn_id.clone(),
            succeeded: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
            degraded: Vec::new(),
            aborted: Some(reason.clone()),
            total_failures: 0,
            consecutive_failures: 0,
        });
        AbortSignal {
            turn_id: turn_id.clone(),
            tool,
            reason,
            error,
            summary,
        }
    }

    /// Emits an authority decision event.
    fn emit_decision(&self, decision: &AuthorityDecision) {
        self.emit(ControlEvent::AuthorityDecision {
            turn_id: decision.turn_id.clone(),
            tool: decision.tool.clone(),
            level: decision.level,
            outcome: decision.outcome,
            reason: decision.reason,
        });
    }

    /// Emits a telemetry event stamped with the current time.
    fn emit(&self, event: ControlEvent) {
        self.sink.record(self.clock.now(), &event);
    }
}

/// Returns the audit label of a failure disposition.
fn disposition_label(disposition: &FailureDisposition) -> &'static str {
    match disposition {
        FailureDisposition::Continue(Remediation::Retry {
            ..
        }) => "retry",
        FailureDisposition::Continue(Remediation::Skip) => "skip",
        FailureDisposition::Continue(Remediation::Degrade) => "degrade",
        FailureDisposition::AbortTurn(_) => "abort_turn",
    }
}
