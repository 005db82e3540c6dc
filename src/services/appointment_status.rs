use crate::{entities::appointment::AppointmentStatus, errors::ServiceError};

/// Validates if an appointment status transition is allowed
pub fn is_valid_transition(from: AppointmentStatus, to: AppointmentStatus) -> bool {
    use AppointmentStatus::*;

    match (from, to) {
        // From pending
        (Pending, InProgress) => true,
        (Pending, Cancelled) => true,

        // From in progress
        (InProgress, Completed) => true,
        (InProgress, Cancelled) => true,

        // Completed and cancelled are terminal; same-state requests are rejected too.
        _ => false,
    }
}

pub fn check_transition(from: AppointmentStatus, to: AppointmentStatus) -> Result<(), ServiceError> {
    if is_valid_transition(from, to) {
        Ok(())
    } else {
        Err(ServiceError::invalid_transition(from, to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;
    use AppointmentStatus::*;

    #[rstest]
    #[case(Pending, InProgress, true)]
    #[case(Pending, Cancelled, true)]
    #[case(Pending, Completed, false)]
    #[case(Pending, Pending, false)]
    #[case(InProgress, Completed, true)]
    #[case(InProgress, Cancelled, true)]
    #[case(InProgress, Pending, false)]
    #[case(Completed, Pending, false)]
    #[case(Completed, Cancelled, false)]
    #[case(Cancelled, InProgress, false)]
    #[case(Cancelled, Cancelled, false)]
    fn transition_table(
        #[case] from: AppointmentStatus,
        #[case] to: AppointmentStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(is_valid_transition(from, to), allowed);
    }

    #[test]
    fn terminal_states_have_no_exits() {
        use sea_orm::Iterable;

        for from in [Completed, Cancelled] {
            assert!(AppointmentStatus::iter().all(|to| !is_valid_transition(from, to)));
        }
    }

    #[test]
    fn rejected_transition_names_both_states() {
        assert_matches!(
            check_transition(Completed, Pending),
            Err(ServiceError::InvalidTransition { from, to }) if from == "COMPLETED" && to == "PENDING"
        );
    }
}
