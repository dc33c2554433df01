use super::errors::{unauthorized, GuardError, GuardResult};
use super::states::BookingState;
use crate::models::{Actor, ActorRole, Booking};
use chrono::{DateTime, Utc};

/// Guard conditions for booking transitions: edge validity, halt status, role
/// authorization and stage deadlines, checked in that order.
#[derive(Debug)]
pub struct TransitionGuard;

impl TransitionGuard {
    /// Run every guard for `booking.status → to` on behalf of `actor`
    pub fn check(
        booking: &Booking,
        to: BookingState,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> GuardResult<()> {
        Self::check_edge(booking.status, to)?;
        Self::check_not_halted(booking, actor)?;
        Self::check_authorization(booking, to, actor)?;
        Self::check_deadlines(booking, to, now)
    }

    /// Terminal states never transition; everything else must follow the table
    pub fn check_edge(from: BookingState, to: BookingState) -> GuardResult<()> {
        if from.is_terminal() || !from.can_transition_to(to) {
            return Err(GuardError::InvalidTransition { from, to });
        }
        Ok(())
    }

    /// Halted bookings only accept admin-driven changes
    pub fn check_not_halted(booking: &Booking, actor: &Actor) -> GuardResult<()> {
        if booking.halted && actor.role != ActorRole::Admin {
            return Err(GuardError::Halted {
                booking_id: booking.id,
            });
        }
        Ok(())
    }

    pub fn check_authorization(
        booking: &Booking,
        to: BookingState,
        actor: &Actor,
    ) -> GuardResult<()> {
        match actor.role {
            ActorRole::Admin => Ok(()),

            ActorRole::System => match to {
                BookingState::Requested
                | BookingState::Matching
                | BookingState::Matched
                | BookingState::Completed
                | BookingState::Cancelled
                | BookingState::PaymentFailed => Ok(()),
                _ => Err(unauthorized(
                    &actor.id,
                    actor.role,
                    to,
                    "automated processes do not drive provider work states",
                )),
            },

            ActorRole::Customer => {
                if to != BookingState::Cancelled {
                    return Err(unauthorized(
                        &actor.id,
                        actor.role,
                        to,
                        "customers may only request cancellation",
                    ));
                }
                if actor.id != booking.customer_id {
                    return Err(unauthorized(
                        &actor.id,
                        actor.role,
                        to,
                        "not the booking's customer",
                    ));
                }
                if !booking.status.precedes(BookingState::InProgress) {
                    return Err(unauthorized(
                        &actor.id,
                        actor.role,
                        to,
                        "cancellation closes once work is in progress",
                    ));
                }
                Ok(())
            }

            ActorRole::Provider => {
                if !to.is_provider_driven() {
                    return Err(unauthorized(
                        &actor.id,
                        actor.role,
                        to,
                        "providers only drive the work stages",
                    ));
                }
                // Acceptance is authorized by holding a live offer, which the claim checks.
                if to == BookingState::Accepted {
                    return Ok(());
                }
                if booking.provider_id.as_deref() != Some(actor.id.as_str()) {
                    return Err(unauthorized(
                        &actor.id,
                        actor.role,
                        to,
                        "only the assigned provider may advance this booking",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Stage deadlines: matching must finish before `matching_expires_at`,
    /// acceptance before `accept_deadline_at`
    pub fn check_deadlines(
        booking: &Booking,
        to: BookingState,
        now: DateTime<Utc>,
    ) -> GuardResult<()> {
        match (booking.status, to) {
            (BookingState::Requested, BookingState::Matching)
            | (BookingState::Matching, BookingState::Matched) => {
                if now >= booking.matching_expires_at {
                    return Err(GuardError::DeadlinePassed {
                        deadline: "matching_expires_at",
                        expired_at: booking.matching_expires_at,
                    });
                }
                Ok(())
            }
            (BookingState::Matched, BookingState::Accepted) => match booking.accept_deadline_at {
                Some(deadline) if now >= deadline => Err(GuardError::DeadlinePassed {
                    deadline: "accept_deadline_at",
                    expired_at: deadline,
                }),
                _ => Ok(()),
            },
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Location, NewBooking, Urgency};
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn booking_in(status: BookingState) -> Booking {
        let mut booking = Booking::new(
            NewBooking {
                customer_id: "customer-1".to_string(),
                service_id: "cleaning".to_string(),
                scheduled_at: None,
                total_amount: dec!(80),
                location: Location::new(40.0, -3.7),
                urgency: Urgency::Standard,
            },
            Utc::now(),
            Duration::minutes(10),
        );
        booking.status = status;
        if status.requires_provider() {
            booking.provider_id = Some("provider-1".to_string());
        }
        booking
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        let booking = booking_in(BookingState::Completed);
        let admin = Actor::admin("ops");
        let err = TransitionGuard::check(&booking, BookingState::Refunded, &admin, Utc::now())
            .unwrap_err();
        assert!(matches!(err, GuardError::InvalidTransition { .. }));
    }

    #[test]
    fn test_customer_may_only_cancel_own_booking() {
        let booking = booking_in(BookingState::Accepted);
        let now = Utc::now();

        assert!(TransitionGuard::check(
            &booking,
            BookingState::Cancelled,
            &Actor::customer("customer-1"),
            now
        )
        .is_ok());

        assert!(matches!(
            TransitionGuard::check(
                &booking,
                BookingState::Cancelled,
                &Actor::customer("someone-else"),
                now
            ),
            Err(GuardError::Unauthorized { .. })
        ));

        assert!(matches!(
            TransitionGuard::check(
                &booking,
                BookingState::Enroute,
                &Actor::customer("customer-1"),
                now
            ),
            Err(GuardError::Unauthorized { .. })
        ));
    }

    #[test]
    fn test_only_assigned_provider_advances_work() {
        let booking = booking_in(BookingState::Accepted);
        let now = Utc::now();
        assert!(TransitionGuard::check(
            &booking,
            BookingState::Enroute,
            &Actor::provider("provider-1"),
            now
        )
        .is_ok());
        assert!(matches!(
            TransitionGuard::check(
                &booking,
                BookingState::Enroute,
                &Actor::provider("provider-2"),
                now
            ),
            Err(GuardError::Unauthorized { .. })
        ));
    }

    #[test]
    fn test_provider_cannot_complete_or_match() {
        let booking = booking_in(BookingState::WorkCompleted);
        assert!(matches!(
            TransitionGuard::check(
                &booking,
                BookingState::Completed,
                &Actor::provider("provider-1"),
                Utc::now()
            ),
            Err(GuardError::Unauthorized { .. })
        ));
        assert!(TransitionGuard::check(
            &booking,
            BookingState::Completed,
            &Actor::system("sweeper"),
            Utc::now()
        )
        .is_ok());
    }

    #[test]
    fn test_system_cannot_drive_work_states() {
        let booking = booking_in(BookingState::Accepted);
        assert!(matches!(
            TransitionGuard::check(
                &booking,
                BookingState::Enroute,
                &Actor::system("sweeper"),
                Utc::now()
            ),
            Err(GuardError::Unauthorized { .. })
        ));
        assert!(TransitionGuard::check(
            &booking,
            BookingState::Enroute,
            &Actor::admin("ops"),
            Utc::now()
        )
        .is_ok());
    }

    #[test]
    fn test_matching_deadline() {
        let booking = booking_in(BookingState::Matching);
        let late = booking.matching_expires_at + Duration::seconds(1);
        let err = TransitionGuard::check(
            &booking,
            BookingState::Matched,
            &Actor::system("dispatcher"),
            late,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            GuardError::DeadlinePassed {
                deadline: "matching_expires_at",
                ..
            }
        ));
    }

    #[test]
    fn test_accept_deadline() {
        let mut booking = booking_in(BookingState::Matched);
        let now = Utc::now();
        booking.accept_deadline_at = Some(now - Duration::seconds(5));
        assert!(matches!(
            TransitionGuard::check_deadlines(&booking, BookingState::Accepted, now),
            Err(GuardError::DeadlinePassed {
                deadline: "accept_deadline_at",
                ..
            })
        ));
    }

    #[test]
    fn test_halted_blocks_non_admin() {
        let mut booking = booking_in(BookingState::Matched);
        booking.halted = true;
        assert!(matches!(
            TransitionGuard::check(
                &booking,
                BookingState::Cancelled,
                &Actor::system("sweeper"),
                Utc::now()
            ),
            Err(GuardError::Halted { .. })
        ));
        assert!(TransitionGuard::check(
            &booking,
            BookingState::Cancelled,
            &Actor::admin("ops"),
            Utc::now()
        )
        .is_ok());
    }
}
