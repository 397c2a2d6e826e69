//! Outreach sequences
//!
//! Templates and multi-step sequences authored through the admin API, and
//! the worker that executes due steps:
//! - Step list editing and validation
//! - Lifecycle (draft, active, paused) and enrollment
//! - Send windows, throttling and suppression
//! - Dispatch over email, sms and call channels
//! - Reply handling and aggregated stats

pub mod dispatch;
pub mod drafts;
pub mod engagement;
pub mod library;
pub mod manager;
pub mod stats;
pub mod steps;
pub mod template;
pub mod throttle;
pub mod validation;
pub mod window;
pub mod worker;

pub use dispatch::{
    ChannelDispatcher, DispatchReceipt, Dispatchers, GatewayDispatcher, LogDispatcher,
    OutboundMessage, SmtpDispatcher,
};
pub use drafts::{SequenceDraft, SequencePatch, TemplateDraft, TemplatePatch};
pub use engagement::{
    DeliveryReceiptInput, DeliveryStatus, EngagementService, OptOutInput, ReplyInput,
    ReplyOutcome,
};
pub use library::TemplateLibrary;
pub use manager::{EnrollContact, SequenceManager};
pub use stats::{ChannelStats, OutreachStats, StatsAggregator};
pub use steps::StepList;
pub use template::{RenderedMessage, TemplateRenderer};
pub use throttle::ThrottleGate;
pub use window::SendWindow;
pub use worker::{SequenceWorker, TickSummary};
