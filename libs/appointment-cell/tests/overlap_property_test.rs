mod common;

use chrono::Duration;
use proptest::prelude::*;

use appointment_cell::models::{AppointmentSearchQuery, CancelAppointmentRequest};
use appointment_cell::AppointmentError;

use common::{at, Clinic};

#[derive(Debug, Clone)]
enum Step {
    Book { start_minute: i64, length: i64 },
    CancelNth(usize),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => (0i64..480, 5i64..120).prop_map(|(start_minute, length)| Step::Book { start_minute, length }),
        1 => (0usize..16).prop_map(Step::CancelNth),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn active_appointments_never_overlap(steps in prop::collection::vec(step(), 1..24)) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();

        runtime.block_on(async {
            let clinic = Clinic::new().await;
            let admin = clinic.admin();
            let mut booked = Vec::new();

            for step in steps {
                match step {
                    Step::Book { start_minute, length } => {
                        let start = at(8, 0) + Duration::minutes(start_minute);
                        let end = start + Duration::minutes(length);
                        match clinic.service.create_appointment(&admin, clinic.booking(start, end)).await {
                            Ok(appointment) => booked.push(appointment.id),
                            Err(AppointmentError::ConflictDetected) => {}
                            Err(other) => panic!("unexpected error: {}", other),
                        }
                    }
                    Step::CancelNth(n) => {
                        if let Some(id) = booked.get(n % booked.len().max(1)) {
                            clinic
                                .service
                                .cancel_appointment(&admin, *id, CancelAppointmentRequest::default())
                                .await
                                .unwrap();
                        }
                    }
                }
            }

            let all = clinic
                .service
                .list_appointments(&admin, AppointmentSearchQuery { limit: Some(200), ..Default::default() })
                .await
                .unwrap();
            let active: Vec<_> = all.into_iter().filter(|a| a.is_active()).collect();

            for (i, a) in active.iter().enumerate() {
                for b in active.iter().skip(i + 1) {
                    assert!(!a.overlaps(b.start_time, b.end_time));
                }
            }
        });
    }
}
