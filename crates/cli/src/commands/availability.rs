use std::sync::Arc;

use booker_core::chrono::{DateTime, Utc};
use booker_core::config::LoadOptions;
use booker_core::domain::calendar::{AvailabilitySlot, ManagerId, TimeWindow};
use booker_core::repositories::ReservationStore;
use booker_core::ReservationEngine;
use booker_db::SqlReservationRepository;
use serde::Serialize;

use crate::commands::{application_failure, load_config, open_pool, runtime, CommandResult};

#[derive(Debug, Serialize)]
struct AvailabilityReport {
    manager_id: String,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    slot_minutes: u32,
    free_slots: usize,
    slots: Vec<AvailabilitySlot>,
}

pub fn run(
    options: &LoadOptions,
    manager_id: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    at: Option<DateTime<Utc>>,
) -> CommandResult {
    if to <= from {
        return CommandResult::failure(
            "availability",
            "invalid_interval",
            "`--to` must be later than `--from`",
            2,
        );
    }
    let config = match load_config("availability", options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match runtime("availability") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };
    let manager = ManagerId(manager_id.to_owned());

    runtime.block_on(async {
        let pool = match open_pool("availability", &config).await {
            Ok(pool) => pool,
            Err(result) => return result,
        };
        let store: Arc<dyn ReservationStore> =
            Arc::new(SqlReservationRepository::new(pool.clone()));
        let engine = ReservationEngine::new(store, config.reservation_policy());
        let slots = engine
            .get_availability(&manager, TimeWindow { from, to }, at.unwrap_or_else(Utc::now))
            .await;
        pool.close().await;

        match slots {
            Ok(slots) => {
                let free_slots = slots.iter().filter(|slot| slot.available).count();
                let report = AvailabilityReport {
                    manager_id: manager.0.clone(),
                    from,
                    to,
                    slot_minutes: config.calendar.slot_minutes,
                    free_slots,
                    slots,
                };
                CommandResult::success_with(
                    "availability",
                    format!("{free_slots} of {} slots free", report.slots.len()),
                    Some(report),
                )
            }
            Err(error) => application_failure("availability", error.into()),
        }
    })
}
