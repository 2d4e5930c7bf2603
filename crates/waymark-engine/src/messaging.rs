//! Messaging Scheduler & Dispatcher.
//!
//! Immediate sends and delayed schedules share one status machine
//! (`scheduled → sent → delivered`, with `failed` as the manual-recovery
//! branch). The due sweep claims each row by transitioning it away from
//! `scheduled` *before* calling the channel, so overlapping sweep
//! invocations cannot double-send.

use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};
use serde::Serialize;
use tracing::{instrument, warn};
use uuid::Uuid;

use waymark_catalog::model::{Catalog, ContactRole, Step, StepConfig};
use waymark_core::activity::{ActivityKind, ActivityRow};
use waymark_core::clock::Clock;
use waymark_core::delivery::{Channel, Contact, DeliveryChannel};
use waymark_core::error::EngineError;
use waymark_core::ids::ChapterId;
use waymark_core::store::{MessageProgressRow, MessageStatus, ProgressStore};
use waymark_core::track::Track;

/// Defines what a "morning" is for delayed messaging steps: a fixed
/// time-of-day in a fixed UTC offset. One policy applies to the whole game
/// (the game plays in one city).
#[derive(Debug, Clone, Copy)]
pub struct SchedulePolicy {
    morning_hour: u32,
    offset: FixedOffset,
}

impl SchedulePolicy {
    /// Builds a policy from an hour of day (0–23) and a UTC offset in
    /// minutes.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Config` when the hour or offset is out of range.
    pub fn new(morning_hour: u32, utc_offset_minutes: i32) -> Result<Self, EngineError> {
        if morning_hour > 23 {
            return Err(EngineError::Config(format!(
                "morning hour {morning_hour} is not a valid hour of day"
            )));
        }
        let offset = FixedOffset::east_opt(utc_offset_minutes * 60).ok_or_else(|| {
            EngineError::Config(format!("UTC offset {utc_offset_minutes}min is out of range"))
        })?;
        Ok(Self {
            morning_hour,
            offset,
        })
    }

    /// Computes the due time for a delay of `mornings` day-boundaries: the
    /// configured time-of-day on the local date `mornings` days after the
    /// current local date.
    #[must_use]
    pub fn due_after_mornings(&self, now: DateTime<Utc>, mornings: u32) -> DateTime<Utc> {
        let local_date = now.with_timezone(&self.offset).date_naive();
        let due_date = local_date + Duration::days(i64::from(mornings));
        let due_naive = due_date
            .and_hms_opt(self.morning_hour, 0, 0)
            .expect("morning_hour is validated to be a valid hour of day");
        self.offset
            .from_local_datetime(&due_naive)
            .single()
            .expect("fixed offsets map local datetimes unambiguously")
            .with_timezone(&Utc)
    }
}

impl Default for SchedulePolicy {
    /// 08:00 UTC.
    fn default() -> Self {
        Self {
            morning_hour: 8,
            offset: FixedOffset::east_opt(0).expect("zero offset is always valid"),
        }
    }
}

/// Per-row outcome counts of one due sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepOutcome {
    /// Rows claimed and handed to the channel successfully.
    pub dispatched: u32,
    /// Rows claimed whose send (or catalog lookup) failed.
    pub failed: u32,
    /// Due rows another invocation claimed first.
    pub skipped: u32,
}

/// Substitutes the `{name}` placeholder with the recipient's display name.
fn render_body(body: &str, recipient: &Contact) -> String {
    body.replace("{name}", &recipient.name)
}

struct MessageFields<'a> {
    to: &'a ContactRole,
    channel: Channel,
    subject: Option<&'a str>,
    body: &'a str,
    progress_key: &'a str,
}

fn message_fields<'a>(step: &'a Step) -> Result<MessageFields<'a>, EngineError> {
    match &step.config {
        StepConfig::Message {
            to,
            channel,
            subject,
            body,
            progress_key,
            ..
        } => Ok(MessageFields {
            to,
            channel: *channel,
            subject: subject.as_deref(),
            body,
            progress_key,
        }),
        _ => Err(EngineError::Precondition(format!(
            "step {} is not a messaging step",
            step.id
        ))),
    }
}

/// Resolves the recipient and hands the message to the delivery channel.
/// Does not touch the store.
async fn dispatch_now(
    track: Track,
    step: &Step,
    catalog: &Catalog,
    delivery: &dyn DeliveryChannel,
) -> Result<(), EngineError> {
    let fields = message_fields(step)?;
    let recipient = catalog
        .rosters
        .for_track(track)
        .resolve(fields.to)
        .ok_or_else(|| {
            EngineError::Config(format!(
                "recipient role {:?} does not resolve on the {track} track",
                fields.to.as_str()
            ))
        })?;
    let body = render_body(fields.body, recipient);
    delivery
        .send(track, fields.channel, recipient, &body, fields.subject)
        .await
}

fn message_row(
    track: Track,
    progress_key: &str,
    status: MessageStatus,
    scheduled_at: Option<DateTime<Utc>>,
    at: DateTime<Utc>,
) -> MessageProgressRow {
    MessageProgressRow {
        id: Uuid::new_v4(),
        track,
        progress_key: progress_key.to_owned(),
        status,
        scheduled_at,
        updated_at: at,
    }
}

/// Sends a messaging step immediately.
///
/// Idempotent: a row already `sent` or `delivered` makes this a no-op.
/// On success the row transitions to `sent`; on failure it is recorded as
/// `failed` and the error propagates to the caller, which decides whether
/// the failure may stall anything (the cascade controller does not let it).
///
/// # Errors
///
/// Returns `EngineError::Precondition` for a non-messaging step,
/// `EngineError::Config` for an unresolvable recipient, and
/// `EngineError::Delivery` when the channel rejects the send.
#[instrument(skip(step, catalog, store, delivery, clock), fields(step_id = %step.id))]
pub async fn send_step(
    track: Track,
    chapter_id: &ChapterId,
    step: &Step,
    catalog: &Catalog,
    store: &dyn ProgressStore,
    delivery: &dyn DeliveryChannel,
    clock: &dyn Clock,
) -> Result<(), EngineError> {
    let fields = message_fields(step)?;
    if let Some(existing) = store.find_message(track, fields.progress_key).await?
        && matches!(
            existing.status,
            MessageStatus::Sent | MessageStatus::Delivered
        )
    {
        return Ok(());
    }

    let now = clock.now();
    match dispatch_now(track, step, catalog, delivery).await {
        Ok(()) => {
            store
                .upsert_message(&message_row(
                    track,
                    fields.progress_key,
                    MessageStatus::Sent,
                    None,
                    now,
                ))
                .await?;
            store
                .append_activity(&ActivityRow::new(
                    track,
                    ActivityKind::MessageSent,
                    serde_json::json!({
                        "chapter": chapter_id,
                        "step": step.id,
                        "progress_key": fields.progress_key,
                    }),
                    now,
                ))
                .await?;
            Ok(())
        }
        Err(err) => {
            store
                .upsert_message(&message_row(
                    track,
                    fields.progress_key,
                    MessageStatus::Failed,
                    None,
                    now,
                ))
                .await?;
            store
                .append_activity(&ActivityRow::new(
                    track,
                    ActivityKind::MessageFailed,
                    serde_json::json!({
                        "chapter": chapter_id,
                        "step": step.id,
                        "progress_key": fields.progress_key,
                        "error": err.to_string(),
                    }),
                    now,
                ))
                .await?;
            Err(err)
        }
    }
}

/// Schedules a messaging step for a future morning.
///
/// A row already `sent` or `delivered` is left alone; a `scheduled` or
/// `failed` row is re-scheduled with the new due time.
///
/// # Errors
///
/// Returns `EngineError::Precondition` for a non-messaging step and store
/// errors otherwise.
#[instrument(skip(step, store, clock, policy), fields(step_id = %step.id))]
pub async fn schedule_step(
    track: Track,
    chapter_id: &ChapterId,
    step: &Step,
    delay_mornings: u32,
    store: &dyn ProgressStore,
    clock: &dyn Clock,
    policy: &SchedulePolicy,
) -> Result<DateTime<Utc>, EngineError> {
    let fields = message_fields(step)?;
    let now = clock.now();
    let due = policy.due_after_mornings(now, delay_mornings);

    if let Some(existing) = store.find_message(track, fields.progress_key).await?
        && matches!(
            existing.status,
            MessageStatus::Sent | MessageStatus::Delivered
        )
    {
        return Ok(due);
    }

    store
        .upsert_message(&message_row(
            track,
            fields.progress_key,
            MessageStatus::Scheduled,
            Some(due),
            now,
        ))
        .await?;
    store
        .append_activity(&ActivityRow::new(
            track,
            ActivityKind::MessageScheduled,
            serde_json::json!({
                "chapter": chapter_id,
                "step": step.id,
                "progress_key": fields.progress_key,
                "due": due,
            }),
            now,
        ))
        .await?;
    Ok(due)
}

/// Dispatches every due scheduled message. Rows are processed
/// independently; one failure does not block the rest. Safe to invoke
/// concurrently and more often than necessary: each row is claimed through
/// the `scheduled → sent` transition before its send, so a row is only ever
/// dispatched by the invocation that won the claim.
///
/// # Errors
///
/// Returns a store error only when the due-row query itself fails;
/// per-row failures are recorded in the outcome and the audit trail.
#[instrument(skip(catalog, store, delivery, clock))]
pub async fn sweep_due_messages(
    catalog: &Catalog,
    store: &dyn ProgressStore,
    delivery: &dyn DeliveryChannel,
    clock: &dyn Clock,
) -> Result<SweepOutcome, EngineError> {
    let due = store.list_due_messages(clock.now()).await?;
    let mut outcome = SweepOutcome::default();

    for row in due {
        let now = clock.now();
        let claimed = store
            .transition_message(
                row.track,
                &row.progress_key,
                MessageStatus::Scheduled,
                MessageStatus::Sent,
                now,
            )
            .await?;
        if !claimed {
            outcome.skipped += 1;
            continue;
        }

        let Some((chapter, step)) = catalog.find_by_progress_key(&row.progress_key) else {
            warn!(progress_key = %row.progress_key, "due message no longer maps to a catalog step");
            store
                .transition_message(
                    row.track,
                    &row.progress_key,
                    MessageStatus::Sent,
                    MessageStatus::Failed,
                    now,
                )
                .await?;
            store
                .append_activity(&ActivityRow::new(
                    row.track,
                    ActivityKind::MessageFailed,
                    serde_json::json!({
                        "progress_key": row.progress_key,
                        "error": "progress key does not map to a catalog step",
                    }),
                    now,
                ))
                .await?;
            outcome.failed += 1;
            continue;
        };

        match dispatch_now(row.track, step, catalog, delivery).await {
            Ok(()) => {
                store
                    .append_activity(&ActivityRow::new(
                        row.track,
                        ActivityKind::MessageSent,
                        serde_json::json!({
                            "chapter": chapter.id,
                            "step": step.id,
                            "progress_key": row.progress_key,
                            "swept": true,
                        }),
                        now,
                    ))
                    .await?;
                outcome.dispatched += 1;
            }
            Err(err) => {
                warn!(progress_key = %row.progress_key, error = %err, "sweep dispatch failed");
                store
                    .transition_message(
                        row.track,
                        &row.progress_key,
                        MessageStatus::Sent,
                        MessageStatus::Failed,
                        now,
                    )
                    .await?;
                store
                    .append_activity(&ActivityRow::new(
                        row.track,
                        ActivityKind::MessageFailed,
                        serde_json::json!({
                            "chapter": chapter.id,
                            "step": step.id,
                            "progress_key": row.progress_key,
                            "error": err.to_string(),
                        }),
                        now,
                    ))
                    .await?;
                outcome.failed += 1;
            }
        }
    }

    Ok(outcome)
}

/// Admin recovery: re-attempts a stuck message immediately.
///
/// # Errors
///
/// Returns `EngineError::Precondition` when no row exists for the key or
/// the row is already `delivered`, and `EngineError::Delivery` when the
/// re-attempt fails again.
#[instrument(skip(catalog, store, delivery, clock))]
pub async fn resend(
    track: Track,
    progress_key: &str,
    catalog: &Catalog,
    store: &dyn ProgressStore,
    delivery: &dyn DeliveryChannel,
    clock: &dyn Clock,
) -> Result<(), EngineError> {
    let row = store
        .find_message(track, progress_key)
        .await?
        .ok_or_else(|| {
            EngineError::Precondition(format!("no message progress for key {progress_key}"))
        })?;
    if row.status == MessageStatus::Delivered {
        return Err(EngineError::Precondition(format!(
            "message {progress_key} is already delivered"
        )));
    }

    let (chapter, step) = catalog.find_by_progress_key(progress_key).ok_or_else(|| {
        EngineError::Precondition(format!(
            "progress key {progress_key} does not map to a catalog step"
        ))
    })?;

    let now = clock.now();
    match dispatch_now(track, step, catalog, delivery).await {
        Ok(()) => {
            store
                .upsert_message(&message_row(
                    track,
                    progress_key,
                    MessageStatus::Sent,
                    None,
                    now,
                ))
                .await?;
            store
                .append_activity(&ActivityRow::new(
                    track,
                    ActivityKind::MessageSent,
                    serde_json::json!({
                        "chapter": chapter.id,
                        "step": step.id,
                        "progress_key": progress_key,
                        "resent": true,
                    }),
                    now,
                ))
                .await?;
            Ok(())
        }
        Err(err) => {
            store
                .upsert_message(&message_row(
                    track,
                    progress_key,
                    MessageStatus::Failed,
                    None,
                    now,
                ))
                .await?;
            store
                .append_activity(&ActivityRow::new(
                    track,
                    ActivityKind::MessageFailed,
                    serde_json::json!({
                        "progress_key": progress_key,
                        "error": err.to_string(),
                        "resent": true,
                    }),
                    now,
                ))
                .await?;
            Err(err)
        }
    }
}

/// Admin confirmation: transitions a `sent` message to `delivered`.
///
/// # Errors
///
/// Returns `EngineError::Precondition` when the row is not in `sent`.
#[instrument(skip(store, clock))]
pub async fn mark_delivered(
    track: Track,
    progress_key: &str,
    store: &dyn ProgressStore,
    clock: &dyn Clock,
) -> Result<(), EngineError> {
    let now = clock.now();
    let won = store
        .transition_message(
            track,
            progress_key,
            MessageStatus::Sent,
            MessageStatus::Delivered,
            now,
        )
        .await?;
    if !won {
        return Err(EngineError::Precondition(format!(
            "message {progress_key} is not in sent state"
        )));
    }
    store
        .append_activity(&ActivityRow::new(
            track,
            ActivityKind::MessageDelivered,
            serde_json::json!({ "progress_key": progress_key }),
            now,
        ))
        .await?;
    Ok(())
}
