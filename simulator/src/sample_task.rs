use crate::dummy_samples::next_reading;
use crate::state::AppState;
use crate::web::emit_reading;
use irrigation_shared::TelemetrySample;
use tokio::time::{interval, Duration};

pub fn get_current_timestamp_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Emits one reading per machine every `every`, forever.
pub async fn sample_task(state: AppState, every: Duration) {
    let mut tick = interval(every);
    log::info!(
        "sample task started: {} machine(s), every {} ms",
        state.machine_ids().len(),
        every.as_millis()
    );

    loop {
        tick.tick().await;

        for id in state.machine_ids() {
            // Snapshot what we need so the lock is not held across the broadcast
            let (previous, setpoints) = {
                let machines = state.machines();
                let Some(rec) = machines.get(&id) else {
                    continue;
                };
                (rec.latest.as_ref().map(|r| r.data.clone()), rec.setpoints)
            };

            let reading = next_reading(&id, previous.as_ref(), &setpoints);
            let sample = TelemetrySample::from_reading(&reading, get_current_timestamp_ms());
            state.record_reading(&reading, sample);
            emit_reading(&state, &reading);
        }
    }
}
