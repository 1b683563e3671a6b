use crate::state::AppState;
use axum::extract::ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use irrigation_shared::api::{
    ApiEnvelope, BikeRegistration, CustomerRegistration, LogRow, LoginBody, LoginRequest,
    LogsBody, RegisterRequest, RemoteUser, RiderRegistration,
};
use irrigation_shared::{events, MachineReading, MachineStatus, PushFrame, SetpointConfig};
use tower_http::cors::CorsLayer;

/// Public router constructor
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/user/login", post(login))
        .route("/user/register", post(register))
        .route("/machine/names/find", get(get_machine_names))
        .route("/machine/{id}", get(get_machine))
        .route("/logs/machines/{id}/lastsix", get(get_last_six))
        .route("/logs/machines/{id}/export-all", get(export_all))
        .route("/bikes/register", post(register_bike))
        .route("/riders/register", post(register_rider))
        .route("/customers/register", post(register_customer))
        .route("/customers/businessnames", get(get_business_names))
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn login(State(state): State<AppState>, Json(req): Json<LoginRequest>) -> Json<ApiEnvelope> {
    if !state.has_machine(&req.machine_id) {
        return Json(ApiEnvelope::err("Unknown machine"));
    }
    match state.check_login(&req.email, &req.password) {
        Some(user) => {
            log::info!("login: {} on {}", req.email, req.machine_id);
            Json(ApiEnvelope::ok(&LoginBody { user }))
        }
        None => Json(ApiEnvelope::err("Invalid email or password")),
    }
}

async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Json<ApiEnvelope> {
    let id = format!("{:024x}", chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0));
    let user = RemoteUser {
        id,
        fname: req.username.clone(),
        lname: String::new(),
        hub: "Main Hub".to_string(),
        location_user: String::new(),
        email: req.email.clone(),
        role: "operator".to_string(),
        permissions: vec!["read".to_string(), "write".to_string()],
    };
    if state.add_user(user, req.password) {
        log::info!("registered {}", req.email);
        Json(ApiEnvelope::ok(&"User registered"))
    } else {
        Json(ApiEnvelope::err("User already exists"))
    }
}

async fn get_machine_names(State(state): State<AppState>) -> Json<ApiEnvelope> {
    Json(ApiEnvelope::ok(&state.machine_names()))
}

async fn get_machine(State(state): State<AppState>, Path(id): Path<String>) -> Json<ApiEnvelope> {
    let machines = state.machines();
    let Some(rec) = machines.get(&id) else {
        return Json(ApiEnvelope::err("Machine not found"));
    };
    match &rec.latest {
        Some(reading) => {
            // Report the current targets, not the ones at sampling time
            let mut reading = reading.clone();
            reading.data.target_temperature = Some(rec.setpoints.target_temperature);
            reading.data.target_humidity = Some(rec.setpoints.target_humidity);
            Json(ApiEnvelope::ok(&reading))
        }
        None => Json(ApiEnvelope::err("No data yet")),
    }
}

async fn get_last_six(State(state): State<AppState>, Path(id): Path<String>) -> Json<ApiEnvelope> {
    let machines = state.machines();
    let Some(rec) = machines.get(&id) else {
        return Json(ApiEnvelope::err("Machine not found"));
    };
    let mut logs: Vec<LogRow> = rec
        .history
        .recent(6)
        .into_iter()
        .map(LogRow::from_sample)
        .collect();
    logs.reverse();
    Json(ApiEnvelope::ok(&LogsBody { logs }))
}

async fn register_bike(
    State(state): State<AppState>,
    Json(bike): Json<BikeRegistration>,
) -> Json<ApiEnvelope> {
    let plate = bike.plate_no.clone();
    match state.add_bike(bike) {
        Ok(()) => {
            log::info!("bike {plate} registered");
            Json(ApiEnvelope::ok(&"Bike added successfully"))
        }
        Err(msg) => Json(ApiEnvelope::err(msg)),
    }
}

async fn register_rider(
    State(state): State<AppState>,
    Json(rider): Json<RiderRegistration>,
) -> Json<ApiEnvelope> {
    match state.add_rider(rider) {
        Ok(()) => Json(ApiEnvelope::ok(&"Rider added successfully")),
        Err(msg) => Json(ApiEnvelope::err(msg)),
    }
}

async fn register_customer(
    State(state): State<AppState>,
    Json(customer): Json<CustomerRegistration>,
) -> Json<ApiEnvelope> {
    match state.add_customer(customer) {
        Ok(id) => {
            log::info!("customer {id} registered");
            Json(ApiEnvelope::ok(&"Customer added successfully"))
        }
        Err(msg) => Json(ApiEnvelope::err(msg)),
    }
}

async fn get_business_names(State(state): State<AppState>) -> Json<ApiEnvelope> {
    Json(ApiEnvelope::ok(&state.business_names()))
}

async fn export_all(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    let machines = state.machines();
    let Some(rec) = machines.get(&id) else {
        return (
            axum::http::StatusCode::NOT_FOUND,
            Json(ApiEnvelope::err("Machine not found")),
        )
            .into_response();
    };

    let mut csv = String::from("timestamp_ms,temperature,humidity,pH,EC,N,P,K\n");
    let opt = |v: Option<f64>| v.map(|x| format!("{x:.2}")).unwrap_or_default();
    for s in rec.history.iter() {
        csv.push_str(&format!(
            "{},{:.2},{:.2},{},{},{},{},{}\n",
            s.timestamp_ms,
            s.temperature,
            s.humidity,
            opt(s.ph),
            opt(s.ec),
            opt(s.n),
            opt(s.p),
            opt(s.k),
        ));
    }

    ([(header::CONTENT_TYPE, "text/csv")], csv).into_response()
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn handle_ws(socket: WebSocket, state: AppState) {
    let mut push_rx = state.push_tx.subscribe();
    let (mut sender, mut receiver) = socket.split();

    // Task: server -> client
    let send_task = async move {
        loop {
            match push_rx.recv().await {
                Ok(frame) => {
                    let text = serde_json::to_string(&frame).unwrap_or_default();
                    if sender
                        .send(Message::Text(Utf8Bytes::from(text)))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    log::debug!("ws client lagged, {n} frame(s) skipped");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    // Task: client -> server
    let recv_state = state.clone();
    let recv_task = async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<PushFrame>(&text) {
                    Ok(frame) => handle_client_frame(&recv_state, &frame),
                    Err(e) => log::warn!("invalid push frame {text:?}: {e}"),
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    };

    // Either side ending closes the connection
    tokio::select! {
        _ = send_task => {}
        _ = recv_task => {}
    }
}

/// Applies a frame sent by a client. Accepted configs are echoed to every
/// client as the machine's actuator status.
pub fn handle_client_frame(state: &AppState, frame: &PushFrame) {
    match frame.event.as_str() {
        events::NEW_CONFIG => {
            let Ok(cfg) = frame.decode::<SetpointConfig>() else {
                log::warn!("malformed {} payload: {}", events::NEW_CONFIG, frame.data);
                return;
            };
            if !state.apply_setpoints(&cfg.machine_id, cfg.setpoints()) {
                log::warn!("config for unknown machine {}", cfg.machine_id);
                return;
            }
            log::info!(
                "config {}: temp={:.2} hum={:.2} motor={} pump={} sprinkler={}",
                cfg.machine_id,
                cfg.temperature,
                cfg.humidity,
                cfg.motor,
                cfg.pump,
                cfg.sprinkler
            );
            emit_status(
                state,
                &MachineStatus {
                    machine: cfg.machine_id.clone(),
                    motor: cfg.motor,
                    pump: cfg.pump,
                    sprinkler: cfg.sprinkler,
                },
            );
        }
        events::MACHINE_STATUS => {
            let Ok(status) = frame.decode::<MachineStatus>() else {
                log::warn!("malformed {} payload: {}", events::MACHINE_STATUS, frame.data);
                return;
            };
            if state.apply_actuators(&status.machine, status.actuators()) {
                emit_status(state, &status);
            }
        }
        other => log::debug!("ignoring client event {other:?}"),
    }
}

/// Broadcast a reading to every websocket client.
pub fn emit_reading(state: &AppState, reading: &MachineReading) {
    match PushFrame::encode(events::NEW_DATA, reading) {
        Ok(frame) => {
            let _ = state.push_tx.send(frame);
        }
        Err(e) => log::warn!("failed to encode reading: {e}"),
    }
}

pub fn emit_status(state: &AppState, status: &MachineStatus) {
    match PushFrame::encode(events::MACHINE_STATUS, status) {
        Ok(frame) => {
            let _ = state.push_tx.send(frame);
        }
        Err(e) => log::warn!("failed to encode status: {e}"),
    }
}
