use askama::Template;
use askama_web::WebTemplate;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Form, Json,
};
use greatideas_db::models::game::{EarnedAchievement, GameSession, Industry};
use greatideas_db::models::user::TelegramUser;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use tracing::{error, info};

use super::tracking::moscow_datetime;
use super::{current_user, script_json, PageContext};
use crate::services::game_service::{ChoiceRequest, GameError, SkillRequest, NEW_GAME_MONEY, STARTING_MONEY};
use crate::services::session_service::SessionHandle;
use crate::AppState;

const LOGIN_URL: &str = "/users/telegram-login/";

#[derive(Template, WebTemplate)]
#[template(path = "game_home.html")]
pub struct GameHomeTemplate {
    pub page: PageContext,
    pub has_active: bool,
}

#[derive(Template, WebTemplate)]
#[template(path = "game_company_name.html")]
pub struct CompanyNameTemplate {
    pub page: PageContext,
    pub default_name: String,
}

pub struct IndustryOption {
    pub code: &'static str,
    pub name: &'static str,
    pub competition: i64,
    pub regulatory_barriers: i64,
    pub profitability: i64,
    pub entry_cost: i64,
    pub growth_potential: i64,
}

fn industry_options() -> Vec<IndustryOption> {
    Industry::ALL
        .iter()
        .map(|industry| {
            let profile = industry.profile();
            IndustryOption {
                code: industry.code(),
                name: industry.display_name(),
                competition: profile.competition,
                regulatory_barriers: profile.regulatory_barriers,
                profitability: profile.profitability,
                entry_cost: profile.entry_cost,
                growth_potential: profile.growth_potential,
            }
        })
        .collect()
}

#[derive(Template, WebTemplate)]
#[template(path = "game_industry.html")]
pub struct IndustryTemplate {
    pub page: PageContext,
    pub company_name: String,
    pub industries: Vec<IndustryOption>,
    pub error: Option<String>,
}

#[derive(Template, WebTemplate)]
#[template(path = "game_play.html")]
pub struct PlayTemplate {
    pub page: PageContext,
    pub page_title: String,
    pub session: Option<GameSession>,
    pub industry_name: String,
    pub daily_income: i64,
    pub daily_expenses: i64,
    pub daily_profit: i64,
    pub hire_cost: i64,
    pub session_json: String,
    pub industries: Vec<IndustryOption>,
}

pub struct SessionRow {
    pub company_name: String,
    pub industry: String,
    pub day: i64,
    pub money: i64,
    pub reputation: i64,
    pub customers: i64,
    pub is_active: bool,
    pub updated_at: String,
}

pub struct AchievementRow {
    pub name: String,
    pub description: String,
    pub icon: String,
    pub earned_at: String,
}

#[derive(Template, WebTemplate)]
#[template(path = "game_stats.html")]
pub struct StatsTemplate {
    pub page: PageContext,
    pub sessions: Vec<SessionRow>,
    pub achievements: Vec<AchievementRow>,
}

fn industry_name(code: &str) -> String {
    Industry::parse(code)
        .map(|i| i.display_name().to_string())
        .unwrap_or_else(|| code.to_string())
}

fn game_error(e: GameError) -> Response {
    let status = match &e {
        GameError::NoActiveSession => StatusCode::NOT_FOUND,
        GameError::Internal(inner) => {
            error!("Game request failed: {:#}", inner);
            StatusCode::INTERNAL_SERVER_ERROR
        }
        _ => StatusCode::BAD_REQUEST,
    };
    (status, Json(json!({ "error": e.to_string() }))).into_response()
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Требуется авторизация" }))).into_response()
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, Response> {
    serde_json::from_slice(body)
        .map_err(|_| (StatusCode::BAD_REQUEST, Json(json!({ "error": "Invalid JSON" }))).into_response())
}

/// GET /game/
pub async fn game_home(State(state): State<AppState>, session: SessionHandle) -> Response {
    let has_active = match current_user(&state, &session).await {
        Some(user) => matches!(state.game_service.active(user.id).await, Ok(Some(_))),
        None => false,
    };
    GameHomeTemplate {
        page: PageContext::load(&state, &session).await,
        has_active,
    }
    .into_response()
}

fn default_company_name(user: &TelegramUser) -> String {
    format!("{}'s Startup", user.login_name())
}

/// GET /game/company-name/
pub async fn company_name_page(State(state): State<AppState>, session: SessionHandle) -> Response {
    let Some(user) = current_user(&state, &session).await else {
        return Redirect::to(LOGIN_URL).into_response();
    };
    CompanyNameTemplate {
        page: PageContext::load(&state, &session).await,
        default_name: default_company_name(&user),
    }
    .into_response()
}

#[derive(Debug, Default, Deserialize)]
pub struct CompanyForm {
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub industry: String,
}

/// POST /game/company-name/
pub async fn company_name_submit(
    State(state): State<AppState>,
    session: SessionHandle,
    Form(form): Form<CompanyForm>,
) -> Response {
    if current_user(&state, &session).await.is_none() {
        return Redirect::to(LOGIN_URL).into_response();
    }
    let name = form.company_name.trim();
    if name.is_empty() {
        return company_name_page(State(state), session).await;
    }
    session.set_company_name(Some(name.to_string())).await;
    Redirect::to("/game/industry/").into_response()
}

async fn industry_page(state: &AppState, session: &SessionHandle, company_name: String, error: Option<String>) -> Response {
    IndustryTemplate {
        page: PageContext::load(state, session).await,
        company_name,
        industries: industry_options(),
        error,
    }
    .into_response()
}

/// GET /game/industry/
pub async fn industry_select(State(state): State<AppState>, session: SessionHandle) -> Response {
    if current_user(&state, &session).await.is_none() {
        return Redirect::to(LOGIN_URL).into_response();
    }
    let Some(company_name) = session.company_name().await else {
        return Redirect::to("/game/company-name/").into_response();
    };
    industry_page(&state, &session, company_name, None).await
}

/// POST /game/industry/: starts a new game with the stored company name.
pub async fn industry_submit(
    State(state): State<AppState>,
    session: SessionHandle,
    Form(form): Form<CompanyForm>,
) -> Response {
    let Some(user) = current_user(&state, &session).await else {
        return Redirect::to(LOGIN_URL).into_response();
    };
    let Some(company_name) = session.company_name().await else {
        return Redirect::to("/game/company-name/").into_response();
    };
    if form.industry.trim().is_empty() {
        return industry_page(&state, &session, company_name, None).await;
    }

    match state
        .game_service
        .start(user.id, &company_name, &form.industry, STARTING_MONEY)
        .await
    {
        Ok(_) => {
            session.set_company_name(None).await;
            Redirect::to("/game/play/").into_response()
        }
        Err(GameError::InvalidIndustry) => {
            let message = GameError::InvalidIndustry.to_string();
            industry_page(&state, &session, company_name, Some(message)).await
        }
        Err(e) => game_error(e),
    }
}

async fn play_page(state: &AppState, session: &SessionHandle, game: Option<GameSession>) -> Response {
    let page = PageContext::load(state, session).await;
    let Some(game) = game else {
        return PlayTemplate {
            page,
            page_title: "Создание стартапа".to_string(),
            session: None,
            industry_name: String::new(),
            daily_income: 0,
            daily_expenses: 0,
            daily_profit: 0,
            hire_cost: 0,
            session_json: "null".to_string(),
            industries: industry_options(),
        }
        .into_response();
    };

    PlayTemplate {
        page,
        page_title: format!("{} - Day {}", game.company_name, game.day),
        industry_name: industry_name(&game.industry),
        daily_income: game.daily_income(),
        daily_expenses: game.daily_expenses(),
        daily_profit: game.daily_income() - game.daily_expenses(),
        hire_cost: game.hire_cost(),
        session_json: script_json(&game.to_json()),
        session: Some(game),
        industries: Vec::new(),
    }
    .into_response()
}

async fn active_game(state: &AppState, user: &TelegramUser) -> Option<GameSession> {
    match state.game_service.active(user.id).await {
        Ok(game) => game,
        Err(e) => {
            error!("Failed to load game for user {}: {:#}", user.id, e);
            None
        }
    }
}

/// GET /game/play/
pub async fn game_play(State(state): State<AppState>, session: SessionHandle) -> Response {
    let Some(user) = current_user(&state, &session).await else {
        return Redirect::to(LOGIN_URL).into_response();
    };
    let game = active_game(&state, &user).await;
    play_page(&state, &session, game).await
}

/// POST /game/play/ with `company_name` and `industry` creates a game when none is running.
pub async fn game_play_create(
    State(state): State<AppState>,
    session: SessionHandle,
    Form(form): Form<CompanyForm>,
) -> Response {
    let Some(user) = current_user(&state, &session).await else {
        return unauthorized();
    };
    let game = active_game(&state, &user).await;
    let company_name = form.company_name.trim();
    if game.is_some() || company_name.is_empty() || form.industry.trim().is_empty() {
        return play_page(&state, &session, game).await;
    }

    match state
        .game_service
        .start(user.id, company_name, &form.industry, STARTING_MONEY)
        .await
    {
        Ok(_) => Json(json!({ "success": true, "redirect": true })).into_response(),
        Err(e) => game_error(e),
    }
}

/// POST /game/new-game/
pub async fn new_game(
    State(state): State<AppState>,
    session: SessionHandle,
    Form(form): Form<CompanyForm>,
) -> Response {
    let Some(user) = current_user(&state, &session).await else {
        return Redirect::to(LOGIN_URL).into_response();
    };
    let name = match form.company_name.trim() {
        "" => default_company_name(&user),
        name => name.to_string(),
    };
    let industry = match form.industry.trim() {
        "" => Industry::It.code(),
        code => code,
    };
    match state.game_service.start(user.id, &name, industry, NEW_GAME_MONEY).await {
        Ok(game) => {
            info!("User {} restarted the game as '{}'", user.id, game.company_name);
            Redirect::to("/game/play/").into_response()
        }
        Err(e) => game_error(e),
    }
}

#[derive(Debug, Deserialize)]
struct ActionRequest {
    #[serde(default)]
    action: String,
}

/// POST /game/api/action/
pub async fn game_action(State(state): State<AppState>, session: SessionHandle, body: Bytes) -> Response {
    let Some(user) = current_user(&state, &session).await else {
        return unauthorized();
    };
    let req: ActionRequest = match parse_body(&body) {
        Ok(req) => req,
        Err(response) => return response,
    };
    match state.game_service.perform_action(user.id, &req.action).await {
        Ok(body) => Json(body).into_response(),
        Err(e) => game_error(e),
    }
}

#[derive(Debug, Default, Deserialize)]
struct SyncRequest {
    game_time: Option<i64>,
    day: Option<i64>,
}

/// POST /game/api/sync-time/
pub async fn sync_time(State(state): State<AppState>, session: SessionHandle, body: Bytes) -> Response {
    let Some(user) = current_user(&state, &session).await else {
        return unauthorized();
    };
    let req: SyncRequest = match parse_body(&body) {
        Ok(req) => req,
        Err(response) => return response,
    };
    match state.game_service.sync_time(user.id, req.game_time, req.day).await {
        Ok(game) => Json(json!({ "success": true, "game_time": game.game_time, "day": game.day })).into_response(),
        Err(e) => game_error(e),
    }
}

/// POST /game/api/choice/
pub async fn process_choice(State(state): State<AppState>, session: SessionHandle, body: Bytes) -> Response {
    let Some(user) = current_user(&state, &session).await else {
        return unauthorized();
    };
    let req: ChoiceRequest = match parse_body(&body) {
        Ok(req) => req,
        Err(response) => return response,
    };
    match state.game_service.process_choice(user.id, &req).await {
        Ok(body) => Json(body).into_response(),
        Err(e) => game_error(e),
    }
}

/// POST /game/api/skill/
pub async fn game_skill(State(state): State<AppState>, session: SessionHandle, body: Bytes) -> Response {
    let Some(user) = current_user(&state, &session).await else {
        return unauthorized();
    };
    let req: SkillRequest = match parse_body(&body) {
        Ok(req) => req,
        Err(response) => return response,
    };
    match state.game_service.set_skill(user.id, &req).await {
        Ok(_) => Json(json!({
            "success": true,
            "skill_type": req.skill_type,
            "value": req.value,
        }))
        .into_response(),
        Err(e) => game_error(e),
    }
}

/// GET /game/api/events/
pub async fn events_api(State(state): State<AppState>, session: SessionHandle) -> Response {
    if current_user(&state, &session).await.is_none() {
        return unauthorized();
    }
    match state.game_service.events_api().await {
        Ok(body) => Json(body).into_response(),
        Err(e) => game_error(GameError::Internal(e)),
    }
}

/// GET /game/api/next-event/
pub async fn next_event(State(state): State<AppState>, session: SessionHandle) -> Response {
    let Some(user) = current_user(&state, &session).await else {
        return unauthorized();
    };
    match state.game_service.next_event(user.id).await {
        Ok(body) => Json(body).into_response(),
        Err(e) => game_error(e),
    }
}

fn achievement_row(a: EarnedAchievement) -> AchievementRow {
    AchievementRow {
        name: a.name,
        description: a.description,
        icon: a.icon,
        earned_at: moscow_datetime(a.earned_at),
    }
}

/// GET /game/stats/
pub async fn game_stats(State(state): State<AppState>, session: SessionHandle) -> Response {
    let Some(user) = current_user(&state, &session).await else {
        return Redirect::to(LOGIN_URL).into_response();
    };
    let (sessions, achievements) = match state.game_service.stats(user.id).await {
        Ok(stats) => stats,
        Err(e) => return game_error(GameError::Internal(e)),
    };
    StatsTemplate {
        page: PageContext::load(&state, &session).await,
        sessions: sessions
            .into_iter()
            .map(|s| SessionRow {
                industry: industry_name(&s.industry),
                updated_at: moscow_datetime(s.updated_at),
                company_name: s.company_name,
                day: s.day,
                money: s.money,
                reputation: s.reputation,
                customers: s.customers,
                is_active: s.is_active,
            })
            .collect(),
        achievements: achievements.into_iter().map(achievement_row).collect(),
    }
    .into_response()
}
