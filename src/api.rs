//! The API surface: read-only HTTP views over a map's Pins, optimization result,
//! measurements, and routes, plus the one mutating endpoint (`PUT /map/{map}/intel/update`).
//! Grounded on the prior closest in-pack precedent for an HTTP JSON/API surface,
//! `r3e-network-neo-rs`'s `rpc.rs` (an `axum::Router` of `State<Arc<...>>` handlers with a
//! bearer-token gate on its one mutating call), generalized here from a JSON-RPC dispatcher to
//! a handful of plain REST routes since the routing core doesn't need RPC batching.

use crate::broadcast::Broadcaster;
use crate::clock::SharedClock;
use crate::geoip::LocateIp;
use crate::hub::HubId;
use crate::intel::Intel;
use crate::map::graph::Map;
use crate::map::pin::PinExport;
use crate::map::state::State as PinState;
use crate::measurements::MeasurementsSnapshot;
use crate::nearest::{Options as NearestOptions, Role, WantVersions};
use crate::optimizer::{OptimizationResult, Optimizer};
use crate::route::{self, NoRouteReason, Query as RouteQuery};
use crate::store::Store;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;

/// Per-map server-side handle bundling everything a request needs. One per map the process
/// participates in.
pub struct MapHandle {
    pub map: Arc<Map>,
    pub optimizer: Arc<Optimizer>,
    pub broadcaster: Arc<Broadcaster>,
    pub store: Option<Arc<Store>>,
    pub measurements_enabled: bool,
}

/// Shared application state behind every handler.
pub struct AppState {
    pub maps: HashMap<String, MapHandle>,
    pub geoip: Arc<dyn LocateIp>,
    pub clock: SharedClock,
    /// `PUT /map/{map}/intel/update` is "self-permission": only the node itself (holding this
    /// token) may push new Intel.
    pub intel_update_token: Option<String>,
}

#[derive(Debug, thiserror::Error)]
enum ApiError {
    #[error("unknown map {0:?}")]
    UnknownMap(String),
    #[error(transparent)]
    Core(#[from] crate::error::Error),
    #[error("unauthorized")]
    Unauthorized,
    #[error("invalid destination {0:?}")]
    InvalidDestination(String),
    #[error(transparent)]
    Intel(#[from] crate::intel::IntelError),
    #[error("intel region config invalid: {0}")]
    Region(#[from] crate::endpoint::ParseError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::UnknownMap(_) => StatusCode::NOT_FOUND,
            ApiError::Core(crate::error::Error::HubNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Core(crate::error::Error::EmptyMap) | ApiError::Core(crate::error::Error::HomeHubUnset) => {
                StatusCode::CONFLICT
            }
            ApiError::Core(crate::error::Error::NoRoute(_)) | ApiError::Core(crate::error::Error::AllPinsDisregarded) => {
                StatusCode::OK // "no route" is a normal, user-visible answer, not a server error.
            }
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::InvalidDestination(_) => StatusCode::BAD_REQUEST,
            ApiError::Core(_) | ApiError::Intel(_) | ApiError::Region(_) => StatusCode::BAD_REQUEST,
        };
        (status, self.to_string()).into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/map/:map/pins", get(get_pins))
        .route("/map/:map/intel/update", put(put_intel_update))
        .route("/map/:map/optimization", get(get_optimization))
        .route("/map/:map/optimization/table", get(get_optimization_table))
        .route("/map/:map/measurements", get(get_measurements))
        .route("/map/:map/measurements/table", get(get_measurements_table))
        .route("/map/:map/route/to/:destination", get(get_route))
        .route("/map/:map/graph.dot", get(get_graph_dot))
        .route("/map/:map/graph.html", get(get_graph_html))
        .with_state(state)
}

fn lookup<'a>(state: &'a AppState, map_name: &str) -> Result<&'a MapHandle, ApiError> {
    state.maps.get(map_name).ok_or_else(|| ApiError::UnknownMap(map_name.to_string()))
}

async fn get_pins(State(state): State<Arc<AppState>>, Path(map_name): Path<String>) -> Result<Json<Vec<PinExport>>, ApiError> {
    let handle = lookup(&state, &map_name)?;
    let r = handle.map.read();
    let exports = r.all.values().map(|p| p.export(false, path_to_home(&r, &p.hub_id))).collect();
    Ok(Json(exports))
}

fn path_to_home(r: &crate::map::graph::MapInner, id: &HubId) -> Option<Vec<HubId>> {
    let home = r.home.clone()?;
    let mut dist = r.all.get(id)?.hop_distance?;
    if *id == home {
        return Some(vec![home]);
    }
    let mut path = vec![id.clone()];
    let mut current = id.clone();
    loop {
        let next = r.all[&current]
            .connected_to
            .iter()
            .filter(|(peer, _)| r.all.get(*peer).and_then(|p| p.hop_distance).map(|d| d < dist).unwrap_or(false))
            .min_by(|(_, a), (_, b)| a.cost.partial_cmp(&b.cost).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(peer, _)| peer.clone())?;
        path.push(next.clone());
        if next == home {
            path.reverse();
            return Some(path);
        }
        dist = r.all.get(&next)?.hop_distance?;
        current = next;
    }
}

#[derive(Debug, Deserialize)]
struct IntelUpdateRequest {
    yaml: String,
    #[serde(default)]
    token: Option<String>,
}

async fn put_intel_update(
    State(state): State<Arc<AppState>>,
    Path(map_name): Path<String>,
    Json(body): Json<IntelUpdateRequest>,
) -> Result<StatusCode, ApiError> {
    if let Some(expected) = &state.intel_update_token {
        if body.token.as_deref() != Some(expected.as_str()) {
            return Err(ApiError::Unauthorized);
        }
    }
    let handle = lookup(&state, &map_name)?;
    let intel = Intel::parse(&body.yaml)?;
    handle.map.update_intel(intel)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_optimization(
    State(state): State<Arc<AppState>>,
    Path(map_name): Path<String>,
) -> Result<Json<OptimizationResult>, ApiError> {
    let handle = lookup(&state, &map_name)?;
    let result = handle.optimizer.run(&handle.map, handle.measurements_enabled, state.clock.now_millis())?;
    Ok(Json(result))
}

async fn get_optimization_table(State(state): State<Arc<AppState>>, Path(map_name): Path<String>) -> Result<String, ApiError> {
    let handle = lookup(&state, &map_name)?;
    let result = handle.optimizer.run(&handle.map, handle.measurements_enabled, state.clock.now_millis())?;
    let mut out = format!("purpose: {:?}\nmax_connect: {}\nstop_others: {}\n", result.purpose, result.max_connect, result.stop_others);
    for id in &result.suggested_connections {
        out.push_str(&format!("- {id}\n"));
    }
    Ok(out)
}

#[derive(Serialize)]
struct MeasurementRow {
    hub_id: HubId,
    #[serde(flatten)]
    snapshot: MeasurementsSnapshot,
}

fn sorted_measurements(handle: &MapHandle) -> Vec<MeasurementRow> {
    let r = handle.map.read();
    let mut rows: Vec<MeasurementRow> = r
        .hubs
        .iter()
        .map(|(id, hub)| MeasurementRow { hub_id: id.clone(), snapshot: hub.measurements.snapshot() })
        .collect();
    rows.sort_by(|a, b| a.snapshot.calculated_cost.partial_cmp(&b.snapshot.calculated_cost).unwrap_or(std::cmp::Ordering::Equal));
    rows
}

async fn get_measurements(State(state): State<Arc<AppState>>, Path(map_name): Path<String>) -> Result<Json<Vec<MeasurementRow>>, ApiError> {
    let handle = lookup(&state, &map_name)?;
    Ok(Json(sorted_measurements(handle)))
}

async fn get_measurements_table(State(state): State<Arc<AppState>>, Path(map_name): Path<String>) -> Result<String, ApiError> {
    let handle = lookup(&state, &map_name)?;
    let mut out = String::from("hub_id\tcost\tlatency_ns\tcapacity_bps\n");
    for row in sorted_measurements(handle) {
        out.push_str(&format!(
            "{}\t{:.1}\t{}\t{}\n",
            row.hub_id,
            row.snapshot.calculated_cost,
            row.snapshot.latency_nanos.map(|v| v.to_string()).unwrap_or_else(|| "-".into()),
            row.snapshot.capacity_bits_per_sec.map(|v| v.to_string()).unwrap_or_else(|| "-".into()),
        ));
    }
    Ok(out)
}

#[derive(Debug, Deserialize)]
struct RouteParams {
    #[serde(default)]
    profile: Option<String>,
    #[serde(default)]
    encrypted: bool,
}

/// Resolves the path segment into the IP version(s) it covers and a `Location` for each, either
/// by parsing it as a literal IP (via the GeoIP capability) or by treating it as an
/// already-known Hub ID.
fn resolve_destination(
    state: &AppState,
    handle: &MapHandle,
    destination: &str,
) -> Result<(WantVersions, Option<crate::geoip::Location>, Option<crate::geoip::Location>, bool), ApiError> {
    if let Ok(ip) = IpAddr::from_str(destination) {
        let want = WantVersions { v4: ip.is_ipv4(), v6: ip.is_ipv6() };
        let loc = state.geoip.locate(ip);
        let anycast = loc.as_ref().map(|l| l.anycast).unwrap_or(false);
        return Ok(match ip {
            IpAddr::V4(_) => (want, loc, None, anycast),
            IpAddr::V6(_) => (want, None, loc, anycast),
        });
    }

    let hub_id = HubId::from(destination.to_string());
    let r = handle.map.read();
    let pin = r.all.get(&hub_id).ok_or_else(|| ApiError::InvalidDestination(destination.to_string()))?;
    let want = WantVersions { v4: pin.entity_v4.is_some(), v6: pin.entity_v6.is_some() };
    Ok((want, pin.location_v4.clone(), pin.location_v6.clone(), false))
}

async fn get_route(
    State(state): State<Arc<AppState>>,
    Path((map_name, destination)): Path<(String, String)>,
    Query(params): Query<RouteParams>,
) -> Result<String, ApiError> {
    let handle = lookup(&state, &map_name)?;
    let (want, target_v4, target_v6, anycast) = resolve_destination(&state, handle, &destination)?;

    let r = handle.map.read();
    let (home_v4, home_v6) = handle
        .map
        .home()
        .and_then(|h| r.all.get(&h).map(|p| (p.location_v4.clone(), p.location_v6.clone())))
        .unwrap_or((None, None));
    drop(r);

    let mut destination_opts = NearestOptions::default();
    let mut transit_opts = NearestOptions::default();
    if params.encrypted {
        // A client asking for an encrypted path wants hops excluded that
        // only ever offered unencrypted service.
        let disregard = PinState::disregard_default() | crate::map::state::ALLOW_UNENCRYPTED;
        destination_opts.disregard = Some(disregard);
        transit_opts.disregard = Some(disregard);
    }

    let query = RouteQuery {
        target_v4: target_v4.as_ref(),
        target_v6: target_v6.as_ref(),
        anycast,
        home_location_v4: home_v4.as_ref(),
        home_location_v6: home_v6.as_ref(),
        want,
        destination_opts,
        transit_opts,
        profile_name: params.profile.as_deref().unwrap_or("single-hop"),
        top_k: route::DEFAULT_TOP_K,
    };

    let mut rng = rand::thread_rng();
    let result = route::find_routes(&handle.map, &query, &mut rng);
    let rendered = route::render_trace(&result);
    match result {
        Ok(_) => Ok(rendered),
        Err(crate::error::Error::NoRoute(NoRouteReason::NoRegardedExits | NoRouteReason::NoPathsUnderProfile)) => Ok(rendered),
        Err(e) => Err(ApiError::Core(e)),
    }
}

/// Graphviz export: the seams for rendering an actual SVG live outside this crate; this
/// produces the `.dot` source directly and a minimal HTML wrapper around it for `graph.html`.
fn render_dot(map: &Map) -> String {
    let r = map.read();
    let mut out = String::from("graph spn {\n");
    let mut seen = std::collections::HashSet::new();
    for (id, pin) in &r.all {
        let label = format!("{id}\\ncost={:.0}", pin.cost);
        out.push_str(&format!("  \"{id}\" [label=\"{label}\"];\n"));
        for peer in pin.connected_to.keys() {
            let key = if id.as_str() < peer.as_str() { (id.clone(), peer.clone()) } else { (peer.clone(), id.clone()) };
            if seen.insert(key) {
                let cost = pin.connected_to[peer].cost;
                out.push_str(&format!("  \"{id}\" -- \"{peer}\" [label=\"{cost:.0}\"];\n"));
            }
        }
    }
    out.push_str("}\n");
    out
}

async fn get_graph_dot(State(state): State<Arc<AppState>>, Path(map_name): Path<String>) -> Result<Response, ApiError> {
    let handle = lookup(&state, &map_name)?;
    let dot = render_dot(&handle.map);
    Ok(([(header::CONTENT_TYPE, "text/vnd.graphviz")], dot).into_response())
}

async fn get_graph_html(State(state): State<Arc<AppState>>, Path(map_name): Path<String>) -> Result<Response, ApiError> {
    let handle = lookup(&state, &map_name)?;
    let dot = render_dot(&handle.map);
    let html = format!("<!doctype html>\n<html><body><pre>{}</pre></body></html>\n", html_escape(&dot));
    Ok(([(header::CONTENT_TYPE, "text/html; charset=utf-8")], html).into_response())
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
