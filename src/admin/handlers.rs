use axum::{extract::State, Json};
use serde::Serialize;
use std::collections::BTreeMap;

use super::AdminState;
use crate::registry::Instance;
use crate::routing::RoutingStatus;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub instance_available: bool,
    pub routing: RoutingStatus,
}

#[derive(Serialize)]
pub struct InstanceStatus {
    pub id: String,
    pub host_address: String,
    pub active: bool,
    pub advertised_health: f64,
    pub live_health: Option<f64>,
    pub effective_health: f64,
    pub current: bool,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let routing = state.controller.status();
    let instance_available = routing.current.is_some();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: if instance_available { "operational" } else { "degraded" },
        instance_available,
        routing,
    })
}

pub async fn get_instances(State(state): State<AdminState>) -> Json<Vec<InstanceStatus>> {
    let controller = &state.controller;
    let view = controller.view();
    let current = controller.current_instance().map(|i| i.id.clone());

    let statuses = controller
        .instances()
        .iter()
        .map(|instance| InstanceStatus {
            id: instance.id.to_string(),
            host_address: instance.host_address.clone(),
            active: instance.active,
            advertised_health: instance.advertised_health,
            live_health: view.get(&instance.id),
            effective_health: view.effective_health(instance),
            current: current.as_ref() == Some(&instance.id),
        })
        .collect();

    Json(statuses)
}

pub async fn get_current(State(state): State<AdminState>) -> Json<Option<Instance>> {
    Json(state.controller.current_instance().map(|i| (*i).clone()))
}

pub async fn get_health(State(state): State<AdminState>) -> Json<BTreeMap<String, f64>> {
    let snapshot = state
        .controller
        .health_snapshot()
        .into_iter()
        .map(|(id, score)| (id.to_string(), score))
        .collect();
    Json(snapshot)
}
