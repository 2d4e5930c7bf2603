//! Waymark Engine — quest progression and delivery.
//!
//! Every public operation here is a short-lived unit of work: it reads the
//! catalog and the progress store, mutates idempotently, and returns. No
//! in-process state survives between invocations; concurrent callers (player
//! device, admin console, periodic sweep) coordinate only through the store's
//! row contents.

pub mod advance;
pub mod hints;
pub mod messaging;
pub mod proximity;
pub mod resolver;
pub mod view;

pub use advance::{AnswerOutcome, EngineContext, activate_chapter, advance, submit_answer};
pub use hints::{list_revealed_tiers, reveal_hint};
pub use messaging::{
    SchedulePolicy, SweepOutcome, mark_delivered, resend, schedule_step, send_step,
    sweep_due_messages,
};
pub use proximity::{ProximityFeedback, proximity_feedback};
pub use resolver::resolve;
pub use view::{ActiveStepView, QuestState, StepPayload};
