//! HTTP host adapter: runs tournaments in memory and takes host notifications over REST.
//! Run with: cargo run --bin arena
//! Listens on 0.0.0.0:8080 by default. Override with env: HOST, PORT.
//! ARENA_CONFIG points at a JSON config used when a create request has no body;
//! ARENA_HISTORY is the placement CSV file (default placements.csv).

use actix_web::{
    get, post,
    web::{Data, Json, Path},
    App, HttpResponse, HttpServer, Responder,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use elimination_arena::adapters::{
    resolve_provider, ArenaContext, ArenaHost, CsvPlacementStore, InMemoryGroupDirectory,
    ScheduledWake, StandInProvider, TokioScheduler, VirtualProvider,
};
use elimination_arena::logic::{JoinRequest, TournamentLifecycle};
use elimination_arena::models::{
    ActorId, Audience, CollaboratorError, Duel, EliminationReason, Entrant, Gate, GroupId,
    Location, Notice, Participant, ParticipantId, Placements, PrizeAward, TournamentConfig,
    TournamentEvent, TournamentId, TournamentState, Vitals, DEFAULT_MAX_HEALTH,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, UnboundedSender};

/// Per-tournament entry: the run, its host view, and when it was last touched.
struct TournamentEntry {
    lifecycle: TournamentLifecycle,
    host: Arc<WebHost>,
    created: Instant,
    last_activity: Instant,
}

type AppState = Data<Mutex<HashMap<TournamentId, TournamentEntry>>>;

/// Finished tournaments not accessed for this long are removed.
const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(12 * 3600);

/// Shared collaborators every tournament of this server uses.
struct Services {
    wakeups: UnboundedSender<ScheduledWake>,
    groups: Arc<InMemoryGroupDirectory>,
    stand_ins: Arc<dyn StandInProvider>,
    store: Arc<CsvPlacementStore>,
    default_config: TournamentConfig,
}

/// One line of a tournament's feed: what players would have seen or what the host was told.
#[derive(Clone, Debug, Serialize)]
struct FeedEntry {
    at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    audience: Option<Audience>,
    text: String,
    payload: serde_json::Value,
}

/// Host side of one tournament. Positions and health are whatever clients last reported.
#[derive(Default)]
struct WebHost {
    feed: Mutex<Vec<FeedEntry>>,
    positions: DashMap<ParticipantId, Location>,
    health: DashMap<ParticipantId, f64>,
}

impl WebHost {
    fn push(&self, audience: Option<Audience>, text: String, payload: serde_json::Value) {
        if let Ok(mut feed) = self.feed.lock() {
            feed.push(FeedEntry {
                at: Utc::now(),
                audience,
                text,
                payload,
            });
        }
    }

    fn feed(&self) -> Vec<FeedEntry> {
        self.feed.lock().map(|f| f.clone()).unwrap_or_default()
    }
}

impl ArenaHost for WebHost {
    fn approve(&self, gate: Gate) -> bool {
        log::debug!("approving {:?}", gate);
        true
    }

    fn teleport(&self, participant: ParticipantId, destination: &Location) -> Result<(), CollaboratorError> {
        self.positions.insert(participant, destination.clone());
        Ok(())
    }

    fn vitals(&self, participant: ParticipantId) -> Result<Vitals, CollaboratorError> {
        let location = self
            .positions
            .get(&participant)
            .map(|l| l.value().clone())
            .ok_or_else(|| CollaboratorError::new("host", format!("no known position for {}", participant)))?;
        let health = self
            .health
            .get(&participant)
            .map(|h| *h)
            .unwrap_or(DEFAULT_MAX_HEALTH);
        Ok(Vitals { location, health })
    }

    fn restore(&self, participant: ParticipantId, vitals: &Vitals) -> Result<(), CollaboratorError> {
        self.positions.insert(participant, vitals.location.clone());
        self.health.insert(participant, vitals.health);
        Ok(())
    }

    fn heal(&self, participant: ParticipantId) -> Result<(), CollaboratorError> {
        self.health.insert(participant, DEFAULT_MAX_HEALTH);
        Ok(())
    }

    fn run_command(&self, command: &str) -> Result<(), CollaboratorError> {
        log::info!("command: {}", command);
        self.push(None, format!("command: {}", command), serde_json::Value::Null);
        Ok(())
    }

    fn set_border(&self, center: &Location, size: u32, damage: f64) -> Result<(), CollaboratorError> {
        self.push(
            None,
            format!("border at {} size {}", center, size),
            serde_json::json!({ "size": size, "damage": damage }),
        );
        Ok(())
    }

    fn reset_border(&self) -> Result<(), CollaboratorError> {
        Ok(())
    }

    fn give_prize(&self, award: &PrizeAward) -> Result<(), CollaboratorError> {
        let payload = serde_json::to_value(award).unwrap_or_default();
        self.push(None, format!("{:?} prize awarded", award.tier), payload);
        Ok(())
    }

    fn notify(&self, audience: Audience, notice: Notice) {
        let payload = serde_json::to_value(&notice).unwrap_or_default();
        self.push(Some(audience), notice.to_string(), payload);
    }

    fn emit(&self, event: TournamentEvent) {
        log::debug!("event: {:?}", event);
        let payload = serde_json::to_value(&event).unwrap_or_default();
        self.push(None, "event".to_string(), payload);
    }
}

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    service: &'static str,
}

/// What a client sees of a tournament.
#[derive(Serialize)]
struct TournamentSnapshot {
    id: TournamentId,
    name: String,
    state: TournamentState,
    current_fighters: Vec<ParticipantId>,
    participants: Vec<Participant>,
    casualties: Vec<Participant>,
    kill_counts: HashMap<ParticipantId, u32>,
    duels: Vec<Duel<Entrant>>,
    waiting_third_place: Vec<Entrant>,
    placements: Placements,
}

impl TournamentSnapshot {
    fn of(lifecycle: &TournamentLifecycle) -> Self {
        Self {
            id: lifecycle.id(),
            name: lifecycle.config().name.clone(),
            state: lifecycle.state(),
            current_fighters: lifecycle.current_fighters(),
            participants: lifecycle.participants().into_iter().cloned().collect(),
            casualties: lifecycle.casualties().into_iter().cloned().collect(),
            kill_counts: lifecycle.kill_counts(),
            duels: lifecycle.bracket().duels().to_vec(),
            waiting_third_place: lifecycle.bracket().waiting_third_place().to_vec(),
            placements: lifecycle.placements().clone(),
        }
    }
}

#[derive(Deserialize)]
struct TournamentPath {
    id: TournamentId,
}

#[derive(Deserialize)]
struct ParticipantPath {
    id: TournamentId,
    participant_id: ParticipantId,
}

#[derive(Deserialize)]
struct ActorPath {
    id: TournamentId,
    actor_id: ActorId,
}

#[derive(Deserialize)]
struct GroupPath {
    group_id: GroupId,
}

#[derive(Deserialize, Default)]
struct DeathBody {
    killer: Option<ParticipantId>,
}

#[derive(Deserialize)]
struct DisconnectBody {
    location: Option<Location>,
    health: Option<f64>,
}

#[derive(Deserialize)]
struct DamageBody {
    attacker: ParticipantId,
    amount: f64,
}

#[derive(Deserialize)]
struct HitBody {
    victim: ParticipantId,
}

#[derive(Deserialize)]
struct EliminateBody {
    reason: String,
}

#[derive(Deserialize)]
struct CancelBody {
    by: String,
}

#[derive(Deserialize)]
struct CreateGroupBody {
    name: String,
}

#[derive(Deserialize)]
struct AddMemberBody {
    participant: ParticipantId,
    #[serde(default)]
    leader: bool,
}

fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(serde_json::json!({ "error": "No tournament" }))
}

/// Run `f` on a tournament under the lock, refreshing its activity time.
fn with_tournament(
    state: &AppState,
    id: TournamentId,
    f: impl FnOnce(&mut TournamentEntry) -> HttpResponse,
) -> HttpResponse {
    let mut g = match state.lock() {
        Ok(guard) => guard,
        Err(_) => return HttpResponse::InternalServerError().body("lock error"),
    };
    match g.get_mut(&id) {
        Some(entry) => {
            entry.last_activity = Instant::now();
            f(entry)
        }
        None => not_found(),
    }
}

#[get("/api/health")]
async fn api_health() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        ok: true,
        service: "elimination-arena",
    })
}

/// Create a tournament and open its lobby. Without a body the server default config is used.
#[post("/api/tournaments")]
async fn api_create_tournament(
    state: AppState,
    services: Data<Services>,
    body: Option<Json<TournamentConfig>>,
) -> HttpResponse {
    let config = body
        .map(|b| b.into_inner())
        .unwrap_or_else(|| services.default_config.clone());
    let id = uuid::Uuid::new_v4();
    let host = Arc::new(WebHost::default());
    let scheduler = Arc::new(TokioScheduler::new(id, services.wakeups.clone()));
    let ctx = ArenaContext::new(config, scheduler, host.clone())
        .with_groups(services.groups.clone())
        .with_stand_ins(services.stand_ins.clone())
        .with_store(services.store.clone());
    let lifecycle = match TournamentLifecycle::start_with_id(id, ctx) {
        Ok(lifecycle) => lifecycle,
        Err(e) => return HttpResponse::BadRequest().json(serde_json::json!({ "error": e.to_string() })),
    };
    let snapshot = TournamentSnapshot::of(&lifecycle);
    let mut g = match state.lock() {
        Ok(guard) => guard,
        Err(_) => return HttpResponse::InternalServerError().body("lock error"),
    };
    g.insert(
        id,
        TournamentEntry {
            lifecycle,
            host,
            created: Instant::now(),
            last_activity: Instant::now(),
        },
    );
    HttpResponse::Ok().json(snapshot)
}

#[get("/api/tournaments/{id}")]
async fn api_get_tournament(state: AppState, path: Path<TournamentPath>) -> HttpResponse {
    with_tournament(&state, path.id, |entry| {
        HttpResponse::Ok().json(TournamentSnapshot::of(&entry.lifecycle))
    })
}

/// Everything the tournament told players and the host so far.
#[get("/api/tournaments/{id}/feed")]
async fn api_get_feed(state: AppState, path: Path<TournamentPath>) -> HttpResponse {
    with_tournament(&state, path.id, |entry| HttpResponse::Ok().json(entry.host.feed()))
}

#[post("/api/tournaments/{id}/join")]
async fn api_join(state: AppState, path: Path<TournamentPath>, body: Json<JoinRequest>) -> HttpResponse {
    with_tournament(&state, path.id, |entry| {
        HttpResponse::Ok().json(entry.lifecycle.on_join(body.into_inner()))
    })
}

#[post("/api/tournaments/{id}/participants/{participant_id}/leave")]
async fn api_leave(state: AppState, path: Path<ParticipantPath>) -> HttpResponse {
    with_tournament(&state, path.id, |entry| {
        let changed = entry.lifecycle.on_leave(path.participant_id);
        HttpResponse::Ok().json(serde_json::json!({ "left": changed }))
    })
}

#[post("/api/tournaments/{id}/participants/{participant_id}/death")]
async fn api_death(state: AppState, path: Path<ParticipantPath>, body: Option<Json<DeathBody>>) -> HttpResponse {
    let killer = body.and_then(|b| b.into_inner().killer);
    with_tournament(&state, path.id, |entry| {
        entry.lifecycle.on_death(path.participant_id, killer);
        HttpResponse::Ok().json(TournamentSnapshot::of(&entry.lifecycle))
    })
}

/// The body carries the participant's last known position and health, for the stand-in.
#[post("/api/tournaments/{id}/participants/{participant_id}/disconnect")]
async fn api_disconnect(
    state: AppState,
    path: Path<ParticipantPath>,
    body: Option<Json<DisconnectBody>>,
) -> HttpResponse {
    with_tournament(&state, path.id, |entry| {
        if let Some(body) = body {
            let body = body.into_inner();
            if let Some(location) = body.location {
                entry.host.positions.insert(path.participant_id, location);
            }
            if let Some(health) = body.health {
                entry.host.health.insert(path.participant_id, health);
            }
        }
        HttpResponse::Ok().json(entry.lifecycle.on_disconnect(path.participant_id))
    })
}

#[post("/api/tournaments/{id}/participants/{participant_id}/reconnect")]
async fn api_reconnect(state: AppState, path: Path<ParticipantPath>) -> HttpResponse {
    with_tournament(&state, path.id, |entry| {
        HttpResponse::Ok().json(entry.lifecycle.on_reconnect(path.participant_id))
    })
}

#[post("/api/tournaments/{id}/participants/{participant_id}/hit")]
async fn api_hit(state: AppState, path: Path<ParticipantPath>, body: Json<HitBody>) -> HttpResponse {
    with_tournament(&state, path.id, |entry| {
        HttpResponse::Ok().json(entry.lifecycle.on_hit(path.participant_id, body.victim))
    })
}

#[post("/api/tournaments/{id}/participants/{participant_id}/eliminate")]
async fn api_eliminate(
    state: AppState,
    path: Path<ParticipantPath>,
    body: Json<EliminateBody>,
) -> HttpResponse {
    let reason = EliminationReason::parse(&body.reason);
    with_tournament(&state, path.id, |entry| {
        let changed = entry.lifecycle.eliminate(path.participant_id, reason);
        HttpResponse::Ok().json(serde_json::json!({ "eliminated": changed }))
    })
}

/// Damage to a stand-in; the server clock (ms since creation) timestamps it.
#[post("/api/tournaments/{id}/stand-ins/{actor_id}/damage")]
async fn api_damage(state: AppState, path: Path<ActorPath>, body: Json<DamageBody>) -> HttpResponse {
    with_tournament(&state, path.id, |entry| {
        let now_ms = entry.created.elapsed().as_millis() as u64;
        let verdict = entry
            .lifecycle
            .on_damage(path.actor_id, body.attacker, body.amount, now_ms);
        HttpResponse::Ok().json(verdict)
    })
}

#[post("/api/tournaments/{id}/cancel")]
async fn api_cancel(state: AppState, path: Path<TournamentPath>, body: Json<CancelBody>) -> HttpResponse {
    with_tournament(&state, path.id, |entry| match entry.lifecycle.cancel(&body.by) {
        Ok(()) => HttpResponse::Ok().json(TournamentSnapshot::of(&entry.lifecycle)),
        Err(e) => HttpResponse::BadRequest().json(serde_json::json!({ "error": e.to_string() })),
    })
}

#[post("/api/groups")]
async fn api_create_group(services: Data<Services>, body: Json<CreateGroupBody>) -> HttpResponse {
    let id = services.groups.create_group(body.into_inner().name);
    HttpResponse::Ok().json(serde_json::json!({ "id": id }))
}

#[post("/api/groups/{group_id}/members")]
async fn api_add_member(
    services: Data<Services>,
    path: Path<GroupPath>,
    body: Json<AddMemberBody>,
) -> HttpResponse {
    if body.leader {
        services.groups.add_leader(path.group_id, body.participant);
    } else {
        services.groups.add_member(path.group_id, body.participant);
    }
    HttpResponse::NoContent().finish()
}

/// Placements recorded so far.
#[get("/api/history")]
async fn api_history(services: Data<Services>) -> HttpResponse {
    match services.store.history() {
        Ok(records) => HttpResponse::Ok().json(records),
        Err(e) => HttpResponse::InternalServerError().json(serde_json::json!({ "error": e.to_string() })),
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_history() -> String {
    "placements.csv".to_string()
}

fn load_default_config() -> TournamentConfig {
    match std::env::var("ARENA_CONFIG") {
        Ok(path) => match TournamentConfig::load(&path) {
            Ok(config) => {
                log::info!("Loaded default tournament config from {}", path);
                config
            }
            Err(e) => {
                log::warn!("Ignoring ARENA_CONFIG: {}", e);
                TournamentConfig::default()
            }
        },
        Err(_) => TournamentConfig::default(),
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let host = std::env::var("HOST").unwrap_or_else(|_| default_host());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or_else(default_port);
    let history = std::env::var("ARENA_HISTORY").unwrap_or_else(|_| default_history());
    let bind = (host.as_str(), port);
    log::info!("Starting server at http://{}:{}", bind.0, bind.1);

    let state = Data::new(Mutex::new(HashMap::<TournamentId, TournamentEntry>::new()));
    let (wakeups, mut wakeup_rx) = mpsc::unbounded_channel::<ScheduledWake>();
    let virtual_provider: Arc<dyn StandInProvider> = Arc::new(VirtualProvider::new());
    let services = Data::new(Services {
        wakeups,
        groups: Arc::new(InMemoryGroupDirectory::new()),
        stand_ins: resolve_provider(vec![virtual_provider]),
        store: Arc::new(CsvPlacementStore::new(history)),
        default_config: load_default_config(),
    });

    // Timer pump: every wake-up is handed to its tournament under the lock
    let state_timers = state.clone();
    actix_web::rt::spawn(async move {
        while let Some(wake) = wakeup_rx.recv().await {
            let mut g = match state_timers.lock() {
                Ok(guard) => guard,
                Err(_) => continue,
            };
            if let Some(entry) = g.get_mut(&wake.tournament) {
                entry.lifecycle.on_timer(wake.fired);
            }
        }
    });

    // Background task: every 30 minutes, remove finished tournaments inactive for 12+ hours
    let state_cleanup = state.clone();
    actix_web::rt::spawn(async move {
        let mut interval = actix_web::rt::time::interval(Duration::from_secs(30 * 60));
        loop {
            interval.tick().await;
            let mut g = match state_cleanup.lock() {
                Ok(guard) => guard,
                Err(_) => continue,
            };
            let before = g.len();
            g.retain(|_, entry| {
                !entry.lifecycle.state().is_finished() || entry.last_activity.elapsed() < INACTIVITY_TIMEOUT
            });
            let removed = before - g.len();
            if removed > 0 {
                log::info!("Cleaned up {} finished tournament(s) (no activity for 12h)", removed);
            }
        }
    });

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(services.clone())
            .service(api_health)
            .service(api_create_tournament)
            .service(api_get_tournament)
            .service(api_get_feed)
            .service(api_join)
            .service(api_leave)
            .service(api_death)
            .service(api_disconnect)
            .service(api_reconnect)
            .service(api_hit)
            .service(api_eliminate)
            .service(api_damage)
            .service(api_cancel)
            .service(api_create_group)
            .service(api_add_member)
            .service(api_history)
    })
    .bind(bind)?
    .run()
    .await
}
