//! Edit propagation: replay a source-message edit against every recorded
//! relayed copy, with fallback recovery when a copy has disappeared.

use super::send::reply_keyboard;
use super::{extract, Extracted, RelayEngine, RelayError};
use crate::message::{EntityKind, InboundMessage};
use crate::models::{Group, RelayRecord};
use crate::platform::{PlatformError, SendOptions};
use crate::render;
use tracing::{debug, warn};

impl RelayEngine {
    /// Handle one edited-message event.
    ///
    /// With no ledger records the edit only matters if it newly introduced a
    /// hashtag, in which case it becomes a first-time relay. With records,
    /// every destination gets exactly one attempt: forward mode re-forwards
    /// and best-effort deletes the old copy; resend mode edits the copy in
    /// place and falls back to a fresh relay when the copy is gone.
    ///
    /// # Errors
    ///
    /// Returns the first store or platform failure that aborts the event.
    /// Individual in-place edit failures other than NotFound are logged and
    /// do not abort the remaining destinations.
    pub async fn handle_edit(&self, msg: &InboundMessage) -> Result<(), RelayError> {
        // Edits to forwarded copies are ignored, same as new forwards.
        let Some(extracted) = extract(msg) else {
            return Ok(());
        };

        let records = self
            .store
            .relays_for(msg.chat_id, extracted.message.message_id)
            .await?;

        if records.is_empty() {
            let has_hashtag = msg
                .entities
                .iter()
                .any(|entity| entity.kind == EntityKind::Hashtag);
            if has_hashtag {
                // Tagged for the first time by this edit: full relay path.
                return self.handle_message(msg).await;
            }
            return Ok(());
        }

        let Some(group) = self.store.group(msg.chat_id).await? else {
            return Ok(());
        };

        // A fallback re-relay appends a fresh record next to the stale one,
        // so keep only the most recent record per destination channel.
        for record in latest_per_channel(records) {
            if group.settings.forwards {
                self.reforward(msg, &extracted, &record).await?;
            } else {
                self.edit_in_place(&group, msg, &extracted, &record).await?;
            }
        }
        Ok(())
    }

    /// Forward-mode edit: forward the edited message afresh, drop the old
    /// copy if it is still there, and record the new copy so the next edit
    /// targets it.
    async fn reforward(
        &self,
        msg: &InboundMessage,
        extracted: &Extracted<'_>,
        record: &RelayRecord,
    ) -> Result<(), RelayError> {
        let copy_id = self
            .platform
            .forward_message(record.channel_id, msg.chat_id, extracted.message.message_id)
            .await?;
        if let Err(err) = self
            .platform
            .delete_message(record.channel_id, record.channel_message_id)
            .await
        {
            // The old copy may already be gone or unremovable.
            debug!(
                channel_id = record.channel_id,
                message_id = record.channel_message_id,
                error = %err,
                "skipped deleting superseded copy"
            );
        }
        self.store
            .record_relay(&RelayRecord::new(
                msg.chat_id,
                extracted.message.message_id,
                record.channel_id,
                copy_id,
            ))
            .await?;
        Ok(())
    }

    /// Resend-mode edit: recompute the caption and keyboard (with refreshed
    /// like counts) and edit the copy in place. A NotFound edit target
    /// triggers a fresh relay plus a new ledger record; any other edit
    /// failure is logged and skipped.
    async fn edit_in_place(
        &self,
        group: &Group,
        msg: &InboundMessage,
        extracted: &Extracted<'_>,
        record: &RelayRecord,
    ) -> Result<(), RelayError> {
        let caption = render::to_html(&extracted.text, &extracted.entities);
        let (plus, minus) = self
            .likes
            .count_likes(record.channel_id, record.channel_message_id)
            .await?;
        let opts = SendOptions {
            caption_html: caption,
            keyboard: reply_keyboard(group, msg, extracted.message.message_id, plus, minus),
        };

        let outcome = if extracted.message.is_plain_text() {
            self.platform
                .edit_message_text(record.channel_id, record.channel_message_id, &opts)
                .await
        } else {
            self.platform
                .edit_message_caption(record.channel_id, record.channel_message_id, &opts)
                .await
        };

        match outcome {
            Ok(()) => Ok(()),
            Err(PlatformError::NotFound) => {
                // The copy vanished: relay afresh and append a new record;
                // the stale record stays (ledger is append-only).
                let copy_id = self
                    .relay_one(group, msg, record.channel_id, extracted)
                    .await?;
                self.store
                    .record_relay(&RelayRecord::new(
                        msg.chat_id,
                        extracted.message.message_id,
                        record.channel_id,
                        copy_id,
                    ))
                    .await?;
                Ok(())
            }
            Err(err) => {
                warn!(
                    channel_id = record.channel_id,
                    message_id = record.channel_message_id,
                    error = %err,
                    "edit of relayed copy failed"
                );
                Ok(())
            }
        }
    }
}

/// Collapse the ledger page to the most recent record per destination
/// channel, preserving first-seen channel order.
fn latest_per_channel(records: Vec<RelayRecord>) -> Vec<RelayRecord> {
    let mut latest: Vec<RelayRecord> = Vec::new();
    for record in records {
        match latest
            .iter_mut()
            .find(|existing| existing.channel_id == record.channel_id)
        {
            Some(existing) => *existing = record,
            None => latest.push(record),
        }
    }
    latest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_per_channel_keeps_newest() {
        let records = vec![
            RelayRecord::new(-1, 10, 100, 1),
            RelayRecord::new(-1, 10, 200, 2),
            RelayRecord::new(-1, 10, 100, 3),
        ];
        let latest = latest_per_channel(records);
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].channel_id, 100);
        assert_eq!(latest[0].channel_message_id, 3);
        assert_eq!(latest[1].channel_id, 200);
        assert_eq!(latest[1].channel_message_id, 2);
    }
}
