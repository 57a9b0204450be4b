// crates/toolgate-core/src/runtime/approvers.rs
// ============================================================================
// Module: Toolgate Approvers
// Description: Channel and callback confirmation approvers.
// Purpose: Route confirmation requests to a human surface or a policy callback.
// Dependencies: crate::core, crate::interfaces, tokio
// ============================================================================

//! ## Overview
//! [`ChannelApprover`] forwards each request as a [`ConfirmationPrompt`]
//! through a `tokio::sync::mpsc` channel and waits for the reply. A prompt
//! dropped without an answer, or a closed channel, is a denial.
//! [`CallbackApprover`] answers synchronously from a closure.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::oneshot;

use crate::core::ApprovalDecision;
use crate::core::PendingConfirmation;
use crate::interfaces::ConfirmationApprover;

// ============================================================================
// SECTION: Channel Approver
// ============================================================================

/// Confirmation request delivered to an approval surface.
#[derive(Debug)]
pub struct ConfirmationPrompt {
    /// Request awaiting a decision.
    pub request: PendingConfirmation,
    /// Reply slot.
    reply: oneshot::Sender<ApprovalDecision>,
}

impl ConfirmationPrompt {
    /// Answers the prompt. Returns false when the requester stopped waiting.
    pub fn answer(self, decision: ApprovalDecision) -> bool {
        self.reply.send(decision).is_ok()
    }

    /// Approves the request.
    pub fn approve(self) -> bool {
        self.answer(ApprovalDecision::Approve)
    }

    /// Refuses the request.
    pub fn deny(self) -> bool {
        self.answer(ApprovalDecision::Deny)
    }
}

/// Approver that forwards requests through a channel.
#[derive(Debug, Clone)]
pub struct ChannelApprover {
    /// Sender used to deliver prompts.
    sender: mpsc::Sender<ConfirmationPrompt>,
}

impl ChannelApprover {
    /// Creates an approver and the receiver its prompts arrive on.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ConfirmationPrompt>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender,
            },
            receiver,
        )
    }
}

#[async_trait]
impl ConfirmationApprover for ChannelApprover {
    async fn decide(&self, request: &PendingConfirmation) -> ApprovalDecision {
        let (reply, answer) = oneshot::channel();
        let prompt = ConfirmationPrompt {
            request: request.clone(),
            reply,
        };
        if self.sender.send(prompt).await.is_err() {
            return ApprovalDecision::Deny;
        }
        answer.await.unwrap_or(ApprovalDecision::Deny)
    }
}

// ============================================================================
// SECTION: Callback Approver
// ============================================================================

/// Callback handler signature used by the approver.
type ApprovalHandler = dyn Fn(&PendingConfirmation) -> ApprovalDecision + Send + Sync;

/// Approver that answers from a closure.
#[derive(Clone)]
pub struct CallbackApprover {
    /// Handler invoked with each request.
    handler: Arc<ApprovalHandler>,
}

impl CallbackApprover {
    /// Creates an approver from a handler function.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&PendingConfirmation) -> ApprovalDecision + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
        }
    }

    /// Approver that refuses every request.
    #[must_use]
    pub fn deny_all() -> Self {
        Self::new(|_| ApprovalDecision::Deny)
    }
}

#[async_trait]
impl ConfirmationApprover for CallbackApprover {
    async fn decide(&self, request: &PendingConfirmation) -> ApprovalDecision {
        (self.handler)(request)
    }
}
