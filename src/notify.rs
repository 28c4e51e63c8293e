//! Notification side-effects.
//!
//! The builders are pure: they decide who is told what. `emit` stores the
//! result and forwards it by mail, and never fails the calling request.

use crate::{
    mailer::{Mailer, OutboundMail},
    models::{Delivery, DeliveryStatus, NewNotification, Nce},
    repository::Repository,
    workflow::NceChange,
};

pub const DELIVERY_STATUS: &str = "delivery_status";
pub const NCE_STATUS: &str = "nce_status";
pub const NCE_UPDATED: &str = "nce_updated";
pub const NCE_CREATED: &str = "nce_created";

fn delivery_link(delivery: &Delivery) -> String {
    format!("/deliveries/{}", delivery.id)
}

fn nce_link(nce: &Nce) -> String {
    format!("/nce/{}", nce.id)
}

/// Sent to the delivery's creator on every status transition.
pub fn delivery_status_changed(delivery: &Delivery, previous: DeliveryStatus) -> NewNotification {
    NewNotification {
        user_id: delivery.created_by,
        title: "Delivery Status Updated".to_string(),
        message: format!(
            "Delivery '{}' status changed from {} to {}",
            delivery.title, previous, delivery.status
        ),
        notification_type: DELIVERY_STATUS.to_string(),
        link: Some(delivery_link(delivery)),
    }
}

/// Sent to the NCE's creator on every update, status change or not.
pub fn nce_updated(nce: &Nce, change: NceChange) -> NewNotification {
    let (title, message, kind) = if change.status_changed() {
        (
            "NCE Status Updated",
            format!(
                "NCE '{}' status changed from {} to {}",
                nce.title, change.previous, change.current
            ),
            NCE_STATUS,
        )
    } else {
        (
            "NCE Updated",
            format!("NCE '{}' was updated (status {})", nce.title, nce.status),
            NCE_UPDATED,
        )
    };

    NewNotification {
        user_id: nce.created_by,
        title: title.to_string(),
        message,
        notification_type: kind.to_string(),
        link: Some(nce_link(nce)),
    }
}

/// Sent to the creator of the delivery the NCE was raised against.
pub fn nce_created(nce: &Nce, delivery: &Delivery) -> NewNotification {
    NewNotification {
        user_id: delivery.created_by,
        title: "New NCE Created".to_string(),
        message: format!(
            "NCE '{}' ({} severity) created for delivery '{}'",
            nce.title, nce.severity, delivery.title
        ),
        notification_type: NCE_CREATED.to_string(),
        link: Some(nce_link(nce)),
    }
}

/// emit
///
/// Best-effort: the primary mutation has already been committed, so storage or
/// mail failures are logged and swallowed.
pub async fn emit(repo: &dyn Repository, mailer: &dyn Mailer, notification: NewNotification) {
    let recipient = notification.user_id;
    let kind = notification.notification_type.clone();

    let stored = match repo.create_notification(notification).await {
        Ok(stored) => stored,
        Err(err) => {
            tracing::warn!(user_id = %recipient, kind = %kind, error = %err, "Failed to store notification");
            return;
        }
    };
    tracing::debug!(notification_id = %stored.id, user_id = %recipient, kind = %kind, "Notification stored");

    let email = match repo.get_user(recipient).await {
        Ok(Some(user)) if user.is_active => user.email,
        Ok(_) => return,
        Err(err) => {
            tracing::warn!(user_id = %recipient, error = %err, "Failed to load notification recipient");
            return;
        }
    };

    let mail = OutboundMail {
        to: email,
        subject: stored.title,
        body: stored.message,
    };
    if let Err(err) = mailer.send(mail).await {
        tracing::warn!(user_id = %recipient, kind = %kind, error = %err, "Failed to send notification mail");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NceStatus, Severity};
    use uuid::Uuid;

    #[test]
    fn delivery_message_names_both_states() {
        let delivery = Delivery {
            id: Uuid::new_v4(),
            title: "Firmware v1".into(),
            created_by: Uuid::new_v4(),
            status: DeliveryStatus::Approved,
            ..Default::default()
        };
        let n = delivery_status_changed(&delivery, DeliveryStatus::Draft);
        assert_eq!(n.user_id, delivery.created_by);
        assert_eq!(n.message, "Delivery 'Firmware v1' status changed from Draft to Approved");
        assert_eq!(n.notification_type, "delivery_status");
        assert_eq!(n.link, Some(format!("/deliveries/{}", delivery.id)));
    }

    #[test]
    fn nce_update_kind_depends_on_status_change() {
        let nce = Nce {
            id: Uuid::new_v4(),
            title: "Scratched casing".into(),
            created_by: Uuid::new_v4(),
            status: NceStatus::InProgress,
            ..Default::default()
        };

        let moved = nce_updated(
            &nce,
            NceChange {
                previous: NceStatus::Open,
                current: NceStatus::InProgress,
            },
        );
        assert_eq!(moved.notification_type, NCE_STATUS);
        assert!(moved.message.contains("from Open to In Progress"));
        assert_eq!(moved.user_id, nce.created_by);

        let patched = nce_updated(
            &nce,
            NceChange {
                previous: NceStatus::InProgress,
                current: NceStatus::InProgress,
            },
        );
        assert_eq!(patched.notification_type, NCE_UPDATED);
        assert_eq!(patched.link, Some(format!("/nce/{}", nce.id)));
    }

    #[test]
    fn nce_creation_goes_to_the_delivery_creator() {
        let delivery = Delivery {
            title: "Batch 7".into(),
            created_by: Uuid::new_v4(),
            ..Default::default()
        };
        let nce = Nce {
            title: "Wrong label".into(),
            severity: Severity::High,
            created_by: Uuid::new_v4(),
            ..Default::default()
        };
        let n = nce_created(&nce, &delivery);
        assert_eq!(n.user_id, delivery.created_by);
        assert_eq!(n.title, "New NCE Created");
        assert_eq!(n.message, "NCE 'Wrong label' (High severity) created for delivery 'Batch 7'");
    }
}
