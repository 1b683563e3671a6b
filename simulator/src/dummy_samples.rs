use irrigation_shared::{MachineReading, SensorData, SetpointState};
use rand::Rng;

/// Fraction of the gap to the setpoint closed per tick.
const DRIFT: f64 = 0.1;

/// Next reading for `machine`. Temperature and humidity drift from
/// `previous` toward the setpoints; the soil values are fresh noise.
pub fn next_reading(
    machine: &str,
    previous: Option<&SensorData>,
    setpoints: &SetpointState,
) -> MachineReading {
    let mut rng = rand::rng();

    let (temp, hum) = match previous {
        Some(d) => (d.temperature, d.humidity),
        None => (rng.random_range(18.0..30.0), rng.random_range(30.0..60.0)),
    };

    // Irrigating raises humidity regardless of the target
    let watering = setpoints.actuators.pump || setpoints.actuators.sprinkler;
    let hum_bias = if watering { 1.5 } else { 0.0 };

    let temperature = temp + (setpoints.target_temperature - temp) * DRIFT
        + rng.random_range(-0.5..0.5);
    let humidity = (hum + (setpoints.target_humidity - hum) * DRIFT
        + hum_bias
        + rng.random_range(-0.5..0.5))
    .clamp(0.0, 100.0);

    MachineReading {
        machine: machine.to_string(),
        data: SensorData {
            temperature,
            humidity,
            // pH 0-14, EC us/cm, NPK mg/kg
            ph: Some(rng.random_range(6.0..7.5)),
            ec: Some(rng.random_range(300.0..900.0)),
            n: Some(rng.random_range(10.0..60.0)),
            p: Some(rng.random_range(5.0..40.0)),
            k: Some(rng.random_range(50.0..250.0)),
            target_temperature: Some(setpoints.target_temperature),
            target_humidity: Some(setpoints.target_humidity),
        },
        created_at: Some(chrono::Utc::now()),
    }
}
