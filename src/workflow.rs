//! Delivery and NCE state machines.
//!
//! These only mutate the in-hand record; persistence and notifications are the
//! caller's job.

use chrono::{DateTime, Utc};

use crate::models::{Delivery, DeliveryStatus, Nce, NceStatus, UpdateDeliveryRequest, UpdateNceRequest};

/// apply_delivery_status
///
/// Any target is accepted. Entering `Approved` stamps `delivered_at` the first
/// time only; no transition ever clears it. Returns the previous status.
pub fn apply_delivery_status(
    delivery: &mut Delivery,
    status: DeliveryStatus,
    now: DateTime<Utc>,
) -> DeliveryStatus {
    let previous = delivery.status;
    delivery.status = status;
    if status == DeliveryStatus::Approved && delivery.delivered_at.is_none() {
        delivery.delivered_at = Some(now);
    }
    previous
}

/// Applies a content edit. Every edit that carries at least one field bumps
/// `version`; returns whether it did.
pub fn apply_delivery_edit(delivery: &mut Delivery, edit: &UpdateDeliveryRequest) -> bool {
    if edit.title.is_none() && edit.description.is_none() {
        return false;
    }
    if let Some(title) = &edit.title {
        delivery.title = title.clone();
    }
    if let Some(description) = &edit.description {
        delivery.description = Some(description.clone());
    }
    delivery.version += 1;
    true
}

/// What an NCE update did, for the notification that follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NceChange {
    pub previous: NceStatus,
    pub current: NceStatus,
}

impl NceChange {
    pub fn status_changed(&self) -> bool {
        self.previous != self.current
    }
}

/// apply_nce_update
///
/// Free transitions between all four states. `resolved_at` is non-null exactly
/// while the NCE is `Resolved` (re-resolving keeps the first stamp).
/// `resolution_notes` is kept only when the resulting status is `Resolved` or
/// `Closed`. Severity, category and assignee patch independently.
pub fn apply_nce_update(nce: &mut Nce, update: &UpdateNceRequest, now: DateTime<Utc>) -> NceChange {
    let previous = nce.status;

    if let Some(status) = update.status {
        nce.status = status;
        nce.resolved_at = match (previous, status) {
            (NceStatus::Resolved, NceStatus::Resolved) => nce.resolved_at.or(Some(now)),
            (_, NceStatus::Resolved) => Some(now),
            _ => None,
        };
    }

    if let Some(notes) = update.resolution_notes.as_deref().filter(|n| !n.trim().is_empty()) {
        if matches!(nce.status, NceStatus::Resolved | NceStatus::Closed) {
            nce.resolution_notes = Some(notes.to_string());
        }
    }

    if let Some(severity) = update.severity {
        nce.severity = severity;
    }
    if let Some(category) = &update.category {
        nce.category = Some(category.clone());
    }
    if let Some(assignee) = update.assigned_to {
        nce.assigned_to = Some(assignee);
    }

    NceChange {
        previous,
        current: nce.status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Severity;
    use chrono::Duration;

    fn status_only(status: NceStatus) -> UpdateNceRequest {
        UpdateNceRequest {
            status: Some(status),
            ..Default::default()
        }
    }

    #[test]
    fn approval_stamps_delivered_at_once() {
        let mut d = Delivery::default();
        let first = Utc::now();
        let later = first + Duration::hours(3);

        assert_eq!(apply_delivery_status(&mut d, DeliveryStatus::Approved, first), DeliveryStatus::Draft);
        assert_eq!(d.delivered_at, Some(first));

        apply_delivery_status(&mut d, DeliveryStatus::Approved, later);
        assert_eq!(d.delivered_at, Some(first));
    }

    #[test]
    fn leaving_approved_keeps_delivered_at() {
        let mut d = Delivery::default();
        let now = Utc::now();
        apply_delivery_status(&mut d, DeliveryStatus::Approved, now);
        apply_delivery_status(&mut d, DeliveryStatus::Rejected, now);
        apply_delivery_status(&mut d, DeliveryStatus::Draft, now);
        assert_eq!(d.status, DeliveryStatus::Draft);
        assert_eq!(d.delivered_at, Some(now));
    }

    #[test]
    fn other_transitions_do_not_stamp() {
        let mut d = Delivery::default();
        apply_delivery_status(&mut d, DeliveryStatus::Delivered, Utc::now());
        assert_eq!(d.delivered_at, None);
    }

    #[test]
    fn content_edit_bumps_version() {
        let mut d = Delivery {
            version: 1,
            ..Default::default()
        };
        assert!(!apply_delivery_edit(&mut d, &UpdateDeliveryRequest::default()));
        assert_eq!(d.version, 1);

        let edit = UpdateDeliveryRequest {
            title: Some("v2 drop".into()),
            description: None,
        };
        assert!(apply_delivery_edit(&mut d, &edit));
        assert_eq!((d.title.as_str(), d.version), ("v2 drop", 2));
    }

    #[test]
    fn resolved_at_tracks_resolved_state() {
        let mut n = Nce::default();
        let now = Utc::now();

        apply_nce_update(&mut n, &status_only(NceStatus::Resolved), now);
        assert_eq!(n.resolved_at, Some(now));

        let change = apply_nce_update(&mut n, &status_only(NceStatus::InProgress), now);
        assert!(change.status_changed());
        assert_eq!(n.resolved_at, None);

        apply_nce_update(&mut n, &status_only(NceStatus::Closed), now);
        assert_eq!(n.resolved_at, None);
    }

    #[test]
    fn re_resolving_keeps_the_first_stamp() {
        let mut n = Nce::default();
        let first = Utc::now();
        apply_nce_update(&mut n, &status_only(NceStatus::Resolved), first);
        let change = apply_nce_update(&mut n, &status_only(NceStatus::Resolved), first + Duration::days(1));
        assert!(!change.status_changed());
        assert_eq!(n.resolved_at, Some(first));
    }

    #[test]
    fn notes_only_stick_on_resolved_or_closed() {
        let mut n = Nce::default();
        let mut update = status_only(NceStatus::InProgress);
        update.resolution_notes = Some("looking into it".into());
        apply_nce_update(&mut n, &update, Utc::now());
        assert_eq!(n.resolution_notes, None);

        update.status = Some(NceStatus::Closed);
        update.resolution_notes = Some("replaced part".into());
        apply_nce_update(&mut n, &update, Utc::now());
        assert_eq!(n.resolution_notes.as_deref(), Some("replaced part"));
    }

    #[test]
    fn field_patch_leaves_status_alone() {
        let mut n = Nce {
            status: NceStatus::Resolved,
            resolved_at: Some(Utc::now()),
            ..Default::default()
        };
        let update = UpdateNceRequest {
            severity: Some(Severity::Critical),
            category: Some("packaging".into()),
            ..Default::default()
        };
        let change = apply_nce_update(&mut n, &update, Utc::now());
        assert!(!change.status_changed());
        assert_eq!(n.severity, Severity::Critical);
        assert_eq!(n.category.as_deref(), Some("packaging"));
        assert!(n.resolved_at.is_some());
    }
}
