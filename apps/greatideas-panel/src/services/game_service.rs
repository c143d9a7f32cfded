use anyhow::Result;
use greatideas_db::models::game::{
    CompletedEvent, EarnedAchievement, EventChoice, EventTemplate, GameSession, Industry, NewGameEvent,
    NewGameSession, Skill, SkillKind,
};
use greatideas_db::repositories::GameRepository;
use rand::Rng;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_COMPANY_NAME: &str = "My Startup";
pub const STARTING_MONEY: i64 = 500;
pub const NEW_GAME_MONEY: i64 = 1000;
/// Minutes past midnight a fresh clock starts at (8:00).
pub const START_GAME_TIME: i64 = 480;

const MARKETING_COST: i64 = 300;
const OFFICE_COST: i64 = 500;
const RANDOM_EVENT_CHANCE: f64 = 0.3;

#[derive(Debug, Error)]
pub enum GameError {
    #[error("Недостаточно денег")]
    InsufficientMoney,
    #[error("Unknown action")]
    UnknownAction,
    #[error("Активная игра не найдена")]
    NoActiveSession,
    #[error("Missing skill_type or value")]
    MissingSkillFields,
    #[error("Invalid skill_type")]
    InvalidSkillType,
    #[error("Неизвестная отрасль")]
    InvalidIndustry,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameAction {
    NextDay,
    HireEmployee,
    MarketingCampaign,
    UpgradeOffice,
}

impl GameAction {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "next_day" => Some(Self::NextDay),
            "hire_employee" => Some(Self::HireEmployee),
            "marketing_campaign" => Some(Self::MarketingCampaign),
            "upgrade_office" => Some(Self::UpgradeOffice),
            _ => None,
        }
    }
}

/// Result of one action, already applied to the session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionOutcome {
    pub message: String,
    pub income: Option<i64>,
    pub expenses: Option<i64>,
    /// Log rows to write, in order.
    pub log: Vec<NewGameEvent>,
    pub random_event: Option<NewGameEvent>,
}

fn clamp_counters(session: &mut GameSession) {
    session.customers = session.customers.max(0);
    session.reputation = session.reputation.max(0);
}

fn apply_changes(session: &mut GameSession, event: &NewGameEvent) {
    session.money += event.money_change;
    session.reputation += event.reputation_change;
    session.employees += event.employees_change;
    session.customers += event.customers_change;
    clamp_counters(session);
}

fn spend(session: &mut GameSession, cost: i64) -> Result<(), GameError> {
    if session.money < cost {
        return Err(GameError::InsufficientMoney);
    }
    session.money -= cost;
    Ok(())
}

pub fn roll_random_event(rng: &mut impl Rng) -> NewGameEvent {
    match rng.random_range(0..3) {
        0 => NewGameEvent {
            event_type: "opportunity".into(),
            title: "Крупный клиент".into(),
            description: "К вам обратился крупный клиент с выгодным предложением!".into(),
            money_change: rng.random_range(200..=500),
            customers_change: rng.random_range(2..=5),
            ..Default::default()
        },
        1 => NewGameEvent {
            event_type: "challenge".into(),
            title: "Конкуренты".into(),
            description: "Конкуренты запустили агрессивную маркетинговую кампанию.".into(),
            customers_change: -rng.random_range(1..=3),
            reputation_change: -rng.random_range(1..=2),
            ..Default::default()
        },
        _ => NewGameEvent {
            event_type: "news".into(),
            title: "Положительные отзывы".into(),
            description: "В прессе появились положительные отзывы о вашей компании!".into(),
            reputation_change: rng.random_range(2..=4),
            customers_change: rng.random_range(1..=3),
            ..Default::default()
        },
    }
}

/// Applies `action` to `session`. On error the session is left untouched.
pub fn apply_action(
    session: &mut GameSession,
    action: GameAction,
    rng: &mut impl Rng,
) -> Result<ActionOutcome, GameError> {
    let mut outcome = ActionOutcome::default();
    match action {
        GameAction::NextDay => {
            let income = session.daily_income() + rng.random_range(0..=100);
            let expenses = session.daily_expenses();
            session.day += 1;
            session.money += income - expenses;

            if rng.random_bool(RANDOM_EVENT_CHANCE) {
                let event = roll_random_event(rng);
                apply_changes(session, &event);
                session.last_event_day = session.day;
                outcome.log.push(event.clone());
                outcome.random_event = Some(event);
            }

            outcome.income = Some(income);
            outcome.expenses = Some(expenses);
            outcome.message = format!("День {}", session.day);
        }
        GameAction::HireEmployee => {
            let cost = session.hire_cost();
            spend(session, cost)?;
            session.employees += 1;
            outcome.log.push(NewGameEvent {
                event_type: "decision".into(),
                title: "Нанят новый сотрудник".into(),
                description: format!(
                    "Вы наняли нового сотрудника за {}$. Теперь у вас {} сотрудников.",
                    cost, session.employees
                ),
                money_change: -cost,
                employees_change: 1,
                ..Default::default()
            });
            outcome.message = format!("Нанят новый сотрудник! Стоимость: {}$", cost);
        }
        GameAction::MarketingCampaign => {
            spend(session, MARKETING_COST)?;
            let customers = rng.random_range(5..=15);
            let reputation = rng.random_range(1..=3);
            session.customers += customers;
            session.reputation += reputation;
            outcome.log.push(NewGameEvent {
                event_type: "decision".into(),
                title: "Маркетинговая кампания".into(),
                description: format!(
                    "Ваша маркетинговая кампания привлекла {} новых клиентов и повысила репутацию на {}.",
                    customers, reputation
                ),
                money_change: -MARKETING_COST,
                customers_change: customers,
                reputation_change: reputation,
                ..Default::default()
            });
            outcome.message = format!("Кампания успешна! +{} клиентов, +{} репутации", customers, reputation);
        }
        GameAction::UpgradeOffice => {
            spend(session, OFFICE_COST)?;
            let reputation = rng.random_range(2..=5);
            session.reputation += reputation;
            outcome.log.push(NewGameEvent {
                event_type: "decision".into(),
                title: "Улучшение офиса".into(),
                description: format!("Вы улучшили офис, что повысило репутацию компании на {}.", reputation),
                money_change: -OFFICE_COST,
                reputation_change: reputation,
                ..Default::default()
            });
            outcome.message = format!("Офис улучшен! +{} репутации", reputation);
        }
    }
    Ok(outcome)
}

/// Applies a scripted choice's cost and effects.
pub fn apply_choice(session: &mut GameSession, choice: &EventChoice) -> Result<NewGameEvent, GameError> {
    spend(session, choice.money_cost)?;
    let change = NewGameEvent {
        event_type: "decision".into(),
        title: choice.title.clone(),
        description: choice.description.clone(),
        money_change: choice.money_effect - choice.money_cost,
        reputation_change: choice.reputation_effect,
        employees_change: choice.employees_effect,
        customers_change: choice.customers_effect,
    };
    session.money += choice.money_effect;
    session.reputation += choice.reputation_effect;
    session.employees += choice.employees_effect;
    session.customers += choice.customers_effect;
    for kind in SkillKind::ALL {
        let value = session.skill(kind) + choice.skill_effect(kind);
        session.set_skill(kind, value);
    }
    clamp_counters(session);
    Ok(change)
}

fn event_json(event: &NewGameEvent) -> Value {
    json!({
        "type": event.event_type,
        "title": event.title,
        "description": event.description,
        "money_change": event.money_change,
        "reputation_change": event.reputation_change,
        "employees_change": event.employees_change,
        "customers_change": event.customers_change,
    })
}

fn choice_json(choice: &EventChoice, skills: &HashMap<i64, Vec<Skill>>) -> Value {
    let skill_names: Vec<&str> = skills
        .get(&choice.id)
        .map(|s| s.iter().map(|s| s.name.as_str()).collect())
        .unwrap_or_default();
    json!({
        "id": choice.choice_id,
        "text": choice.title,
        "description": choice.description,
        "timeCost": choice.time_cost,
        "moneyCost": choice.money_cost,
        "effects": choice.effects(),
        "buttonStyle": choice.button_style,
        "skills": skill_names,
    })
}

fn template_json(template: &EventTemplate, choices: &[EventChoice], skills: &HashMap<i64, Vec<Skill>>) -> Value {
    json!({
        "title": template.title,
        "description": template.description,
        "choices": choices.iter().map(|c| choice_json(c, skills)).collect::<Vec<_>>(),
    })
}

/// Delay in days before a choice unlocks its follow-ups, keyed by
/// `(event key, choice id)`.
pub type ChoiceDelays = HashMap<(String, String), i64>;

/// Picks the next scripted event: triggered follow-ups first, then the next
/// sequential event, then a random one that passes its chance.
pub fn select_next_event<'a>(
    day: i64,
    templates: &'a [EventTemplate],
    completed: &[CompletedEvent],
    choice_delays: &ChoiceDelays,
    mut passes_chance: impl FnMut(f64) -> bool,
) -> Option<&'a EventTemplate> {
    let done: HashSet<&str> = completed.iter().map(|c| c.event_key.as_str()).collect();
    let open: Vec<&'a EventTemplate> = templates.iter().filter(|t| !done.contains(t.key.as_str())).collect();

    let ready_choices: HashSet<&str> = completed
        .iter()
        .filter(|c| {
            let delay = choice_delays
                .get(&(c.event_key.clone(), c.choice_id.clone()))
                .copied()
                .unwrap_or(1);
            day - c.game_day >= delay
        })
        .map(|c| c.choice_id.as_str())
        .collect();

    if let Some(t) = open.iter().copied().filter(|t| t.trigger_type == "triggered").find(|t| {
        t.parent_choice_ids().iter().any(|id| ready_choices.contains(id))
    }) {
        return Some(t);
    }

    if let Some(t) = open
        .iter()
        .copied()
        .filter(|t| t.trigger_type == "sequential")
        .min_by_key(|t| (t.sort_order, t.id))
    {
        return Some(t);
    }

    open.into_iter()
        .filter(|t| t.trigger_type == "random" && t.in_day_range(day))
        .find(|t| passes_chance(t.random_chance))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChoiceRequest {
    pub event_key: Option<String>,
    #[serde(default)]
    pub choice: String,
    pub dice_roll: Option<i64>,
    pub money: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SkillRequest {
    pub skill_type: Option<String>,
    pub value: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct GameService {
    repo: GameRepository,
}

impl GameService {
    pub fn new(repo: GameRepository) -> Self {
        Self { repo }
    }

    pub fn repo(&self) -> &GameRepository {
        &self.repo
    }

    pub async fn active(&self, user_id: i64) -> Result<Option<GameSession>> {
        self.repo.active_for_user(user_id).await
    }

    async fn require_active(&self, user_id: i64) -> Result<GameSession, GameError> {
        self.repo.active_for_user(user_id).await?.ok_or(GameError::NoActiveSession)
    }

    /// Ends any running game and starts a new one.
    pub async fn start(&self, user_id: i64, company_name: &str, industry: &str, money: i64) -> Result<GameSession, GameError> {
        let industry = Industry::parse(industry).ok_or(GameError::InvalidIndustry)?;
        let name = company_name.trim();
        let session = self
            .repo
            .start_session(
                user_id,
                &NewGameSession {
                    company_name: if name.is_empty() { DEFAULT_COMPANY_NAME.to_string() } else { name.to_string() },
                    industry,
                    money,
                },
            )
            .await?;
        info!("User {} started game session {} ({})", user_id, session.id, industry.code());
        Ok(session)
    }

    pub async fn perform_action(&self, user_id: i64, action: &str) -> Result<Value, GameError> {
        let mut session = self.require_active(user_id).await?;
        let action = GameAction::parse(action).ok_or(GameError::UnknownAction)?;

        let outcome = {
            let mut rng = rand::rng();
            apply_action(&mut session, action, &mut rng)?
        };

        let session = self.repo.save(&session).await?;
        for entry in &outcome.log {
            self.repo.log_event(session.id, session.day, entry).await?;
        }
        let achievements = self.award_achievements(&session).await?;

        let mut body = json!({
            "success": true,
            "message": outcome.message,
            "day": session.day,
            "money": session.money,
            "reputation": session.reputation,
            "employees": session.employees,
            "customers": session.customers,
            "daily_income": outcome.income.unwrap_or_else(|| session.daily_income()),
            "daily_expenses": outcome.expenses.unwrap_or_else(|| session.daily_expenses()),
            "hire_cost": session.hire_cost(),
            "achievements": achievements,
        });
        if let Some(event) = &outcome.random_event {
            body["event"] = event_json(event);
        }
        Ok(body)
    }

    /// Overwrites the clock with the client's values. Missing fields reset to
    /// 8:00 on day 1.
    pub async fn sync_time(&self, user_id: i64, game_time: Option<i64>, day: Option<i64>) -> Result<GameSession, GameError> {
        let mut session = self.require_active(user_id).await?;
        session.game_time = game_time.unwrap_or(START_GAME_TIME);
        session.day = day.unwrap_or(1);
        Ok(self.repo.save(&session).await?)
    }

    /// Records a decision. Known choices are applied once per session.
    pub async fn process_choice(&self, user_id: i64, req: &ChoiceRequest) -> Result<Value, GameError> {
        let mut session = self.require_active(user_id).await?;
        session.last_decision = req.choice.clone();
        if let Some(roll) = req.dice_roll {
            session.dice_roll = roll;
        }
        session.game_paused = false;

        let found = match req.event_key.as_deref().filter(|k| !k.is_empty()) {
            Some(key) => self.repo.find_choice(key, &req.choice).await?,
            None => None,
        };

        let mut applied = None;
        match found {
            Some((template, choice)) => {
                let already = self
                    .repo
                    .completed_for_session(session.id)
                    .await?
                    .iter()
                    .any(|c| c.event_key == template.key);
                if !already {
                    let mut chosen = session.clone();
                    let change = apply_choice(&mut chosen, &choice)?;
                    let log = NewGameEvent { title: template.title.clone(), ..change };
                    applied = self
                        .repo
                        .commit_choice(&chosen, &template.key, &choice.choice_id, &log)
                        .await?;
                }
            }
            None => {
                if let Some(money) = req.money {
                    session.money = money;
                }
            }
        }

        let (session, applied) = match applied {
            Some(saved) => (saved, true),
            None => (self.repo.save(&session).await?, false),
        };
        let achievements = self.award_achievements(&session).await?;
        debug!("Choice '{}' in session {} (applied: {})", req.choice, session.id, applied);
        Ok(json!({
            "success": true,
            "applied": applied,
            "session": session.to_json(),
            "achievements": achievements,
        }))
    }

    pub async fn set_skill(&self, user_id: i64, req: &SkillRequest) -> Result<GameSession, GameError> {
        let (Some(skill_type), Some(value)) = (req.skill_type.as_deref().filter(|s| !s.is_empty()), req.value) else {
            return Err(GameError::MissingSkillFields);
        };
        let kind = SkillKind::parse(skill_type).ok_or(GameError::InvalidSkillType)?;
        let mut session = self.require_active(user_id).await?;
        session.set_skill(kind, value);
        Ok(self.repo.save(&session).await?)
    }

    pub async fn events_api(&self) -> Result<Value> {
        let templates = self.repo.active_templates().await?;
        let ids: Vec<i64> = templates.iter().map(|t| t.id).collect();
        let choices = self.repo.choices_by_template(&ids).await?;
        let skills_by_choice = self.repo.skills_by_choice().await?;

        let events: Map<String, Value> = templates
            .iter()
            .map(|t| {
                let list = choices.get(&t.id).map(Vec::as_slice).unwrap_or_default();
                (t.key.clone(), template_json(t, list, &skills_by_choice))
            })
            .collect();

        let skills: Vec<Value> = self
            .repo
            .active_skills()
            .await?
            .iter()
            .map(|s| {
                json!({
                    "name": s.name,
                    "displayName": s.display_name,
                    "color": s.color,
                    "icon": s.icon,
                    "sessionField": s.session_field,
                    "type": s.name,
                })
            })
            .collect();

        Ok(json!({ "events": events, "availableSkills": skills }))
    }

    pub async fn next_event(&self, user_id: i64) -> Result<Value, GameError> {
        let session = self.require_active(user_id).await?;
        let templates = self.repo.active_templates().await?;
        let completed = self.repo.completed_for_session(session.id).await?;

        let ids: Vec<i64> = templates.iter().map(|t| t.id).collect();
        let choices = self.repo.choices_by_template(&ids).await?;
        let delays: ChoiceDelays = templates
            .iter()
            .flat_map(|t| {
                choices
                    .get(&t.id)
                    .into_iter()
                    .flatten()
                    .map(move |c| ((t.key.clone(), c.choice_id.clone()), c.next_event_delay))
            })
            .collect();

        let picked = {
            let mut rng = rand::rng();
            select_next_event(session.day, &templates, &completed, &delays, |chance| rng.random_bool(chance.clamp(0.0, 1.0)))
        };

        let Some(template) = picked else {
            return Ok(json!({ "success": true, "event": null }));
        };
        let skills_by_choice = self.repo.skills_by_choice().await?;
        let list = choices.get(&template.id).map(Vec::as_slice).unwrap_or_default();
        let mut event = template_json(template, list, &skills_by_choice);
        event["key"] = json!(template.key);
        Ok(json!({ "success": true, "event": event }))
    }

    /// Awards every newly met achievement and returns their names.
    pub async fn award_achievements(&self, session: &GameSession) -> Result<Vec<String>> {
        let mut awarded = Vec::new();
        for achievement in self.repo.unearned_achievements(session.user_id).await? {
            if achievement.is_met_by(session)
                && self.repo.award(session.user_id, achievement.id, session.id).await?
            {
                info!("User {} earned achievement '{}'", session.user_id, achievement.name);
                awarded.push(achievement.name);
            }
        }
        Ok(awarded)
    }

    pub async fn stats(&self, user_id: i64) -> Result<(Vec<GameSession>, Vec<EarnedAchievement>)> {
        Ok((
            self.repo.list_for_user(user_id).await?,
            self.repo.earned_for_user(user_id).await?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::game_content::load_test_events;
    use chrono::Utc;
    use greatideas_db::models::game::TemplateSeed;
    use greatideas_db::models::user::TelegramProfile;
    use greatideas_db::repositories::UserRepository;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    async fn setup() -> (GameService, i64) {
        let pool = greatideas_db::connect_memory().await.unwrap();
        let (user, _) = UserRepository::new(pool.clone())
            .upsert_profile(&TelegramProfile { telegram_id: 77, first_name: "Олег".into(), ..Default::default() })
            .await
            .unwrap();
        (GameService::new(GameRepository::new(pool)), user.id)
    }

    async fn session(service: &GameService, user_id: i64) -> GameSession {
        service.start(user_id, "Кофе & Код", "IT", STARTING_MONEY).await.unwrap()
    }

    #[tokio::test]
    async fn hire_cost_grows_and_unaffordable_actions_do_not_mutate() {
        let (service, user_id) = setup().await;
        let mut s = session(&service, user_id).await;
        let mut rng = StdRng::seed_from_u64(7);

        assert_eq!(s.hire_cost(), 250);
        apply_action(&mut s, GameAction::HireEmployee, &mut rng).unwrap();
        assert_eq!(s.employees, 2);
        assert_eq!(s.money, 250);
        assert_eq!(s.hire_cost(), 300);

        let before = s.clone();
        let err = apply_action(&mut s, GameAction::HireEmployee, &mut rng).unwrap_err();
        assert!(matches!(err, GameError::InsufficientMoney));
        assert_eq!(err.to_string(), "Недостаточно денег");
        assert_eq!(s.money, before.money);
        assert_eq!(s.employees, before.employees);
        assert!(matches!(
            apply_action(&mut s, GameAction::UpgradeOffice, &mut rng),
            Err(GameError::InsufficientMoney)
        ));
    }

    #[tokio::test]
    async fn next_day_applies_income_and_expenses() {
        let (service, user_id) = setup().await;
        let mut s = session(&service, user_id).await;
        s.customers = 20;
        let mut rng = StdRng::seed_from_u64(1);

        let outcome = apply_action(&mut s, GameAction::NextDay, &mut rng).unwrap();
        let income = outcome.income.unwrap();
        assert!((200..=300).contains(&income));
        assert_eq!(outcome.expenses, Some(50));
        assert_eq!(s.day, 2);
        let event_money = outcome.random_event.as_ref().map_or(0, |e| e.money_change);
        assert_eq!(s.money, STARTING_MONEY + income - 50 + event_money);
        assert!(s.customers >= 0);
    }

    #[test]
    fn random_events_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let e = roll_random_event(&mut rng);
            match e.event_type.as_str() {
                "opportunity" => {
                    assert!((200..=500).contains(&e.money_change));
                    assert!((2..=5).contains(&e.customers_change));
                }
                "challenge" => {
                    assert!((-3..=-1).contains(&e.customers_change));
                    assert!((-2..=-1).contains(&e.reputation_change));
                }
                "news" => {
                    assert!((2..=4).contains(&e.reputation_change));
                    assert!((1..=3).contains(&e.customers_change));
                }
                other => panic!("unexpected event type {other}"),
            }
        }
    }

    #[tokio::test]
    async fn actions_require_session_and_known_name() {
        let (service, user_id) = setup().await;
        assert!(matches!(
            service.perform_action(user_id, "next_day").await,
            Err(GameError::NoActiveSession)
        ));
        session(&service, user_id).await;
        assert!(matches!(
            service.perform_action(user_id, "buy_yacht").await,
            Err(GameError::UnknownAction)
        ));

        let body = service.perform_action(user_id, "hire_employee").await.unwrap();
        assert_eq!(body["employees"], 2);
        assert_eq!(body["message"], "Нанят новый сотрудник! Стоимость: 250$");
        let s = service.active(user_id).await.unwrap().unwrap();
        let log = service.repo().events_for_session(s.id).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].event_type, "decision");
    }

    #[tokio::test]
    async fn known_choice_is_applied_once() {
        let (service, user_id) = setup().await;
        load_test_events(service.repo()).await.unwrap();
        session(&service, user_id).await;

        let req = ChoiceRequest {
            event_key: Some("presentation_event".into()),
            choice: "pitch_demo".into(),
            dice_roll: Some(5),
            money: Some(99999),
        };
        let body = service.process_choice(user_id, &req).await.unwrap();
        assert_eq!(body["applied"], true);
        assert_eq!(body["session"]["skills"]["pitching"], 10);
        assert_eq!(body["session"]["skills"]["prototype"], 5);
        assert_eq!(body["session"]["customers"], 2);
        assert_eq!(body["session"]["money"], STARTING_MONEY);
        assert_eq!(body["session"]["dice_roll"], 5);

        let again = service.process_choice(user_id, &req).await.unwrap();
        assert_eq!(again["applied"], false);
        assert_eq!(again["session"]["skills"]["pitching"], 10);
    }

    #[tokio::test]
    async fn unknown_choice_stores_reported_money() {
        let (service, user_id) = setup().await;
        load_test_events(service.repo()).await.unwrap();
        session(&service, user_id).await;
        let body = service
            .process_choice(user_id, &ChoiceRequest { choice: "custom".into(), money: Some(1234), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(body["applied"], false);
        assert_eq!(body["session"]["money"], 1234);
        assert_eq!(body["achievements"], json!(["Первая тысяча"]));
    }

    #[tokio::test]
    async fn skill_api_validates_input() {
        let (service, user_id) = setup().await;
        session(&service, user_id).await;
        assert!(matches!(
            service.set_skill(user_id, &SkillRequest { skill_type: Some("team".into()), value: None }).await,
            Err(GameError::MissingSkillFields)
        ));
        assert!(matches!(
            service.set_skill(user_id, &SkillRequest { skill_type: Some("charisma".into()), value: Some(3) }).await,
            Err(GameError::InvalidSkillType)
        ));
        let s = service
            .set_skill(user_id, &SkillRequest { skill_type: Some("marketing".into()), value: Some(12) })
            .await
            .unwrap();
        assert_eq!(s.marketing_skill, 12);
    }

    #[tokio::test]
    async fn events_api_lists_choices_with_skills() {
        let (service, _) = setup().await;
        load_test_events(service.repo()).await.unwrap();
        let body = service.events_api().await.unwrap();
        let first = &body["events"]["first_idea"];
        assert_eq!(first["title"], "Первая идея");
        assert_eq!(first["choices"][0]["id"], "research");
        assert_eq!(first["choices"][0]["moneyCost"], 100);
        assert_eq!(first["choices"][0]["effects"], json!({"reputation": 5}));
        assert_eq!(first["choices"][0]["skills"], json!(["marketing"]));
        assert_eq!(body["availableSkills"].as_array().unwrap().len(), 5);
        assert_eq!(body["availableSkills"][0]["sessionField"], "prototype_skill");
    }

    #[tokio::test]
    async fn next_event_follows_order_then_triggers() {
        let (service, user_id) = setup().await;
        load_test_events(service.repo()).await.unwrap();
        let follow_up = service
            .repo()
            .upsert_template(&TemplateSeed {
                key: "investor_call",
                title: "Звонок инвестора",
                description: "Инвестор хочет узнать подробности.",
                sort_order: 10,
                trigger_type: "triggered",
                parent_choices: "angel_investors",
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(follow_up.trigger_type, "triggered");
        session(&service, user_id).await;

        let body = service.next_event(user_id).await.unwrap();
        assert_eq!(body["event"]["key"], "first_idea");

        let s = service.active(user_id).await.unwrap().unwrap();
        service.repo().record_completed(s.id, "first_idea", "research", 1).await.unwrap();
        service.repo().record_completed(s.id, "funding_search", "angel_investors", 1).await.unwrap();
        let body = service.next_event(user_id).await.unwrap();
        assert_eq!(body["event"]["key"], "presentation_event");

        service.sync_time(user_id, Some(600), Some(2)).await.unwrap();
        let body = service.next_event(user_id).await.unwrap();
        assert_eq!(body["event"]["key"], "investor_call");
    }

    #[test]
    fn random_templates_respect_day_range() {
        let now = Utc::now();
        let template = |key: &str, min_day: i64, max_day: Option<i64>| EventTemplate {
            id: 1,
            key: key.into(),
            title: String::new(),
            description: String::new(),
            sort_order: 0,
            is_active: true,
            trigger_type: "random".into(),
            random_chance: 0.5,
            min_day,
            max_day,
            parent_choices: String::new(),
        };
        let templates = vec![template("late", 10, None), template("early", 1, Some(3))];
        let picked = select_next_event(2, &templates, &[], &ChoiceDelays::new(), |_| true);
        assert_eq!(picked.map(|t| t.key.as_str()), Some("early"));
        assert!(select_next_event(2, &templates, &[], &ChoiceDelays::new(), |_| false).is_none());

        let done = vec![CompletedEvent {
            id: 1,
            session_id: 1,
            event_key: "early".into(),
            choice_id: "x".into(),
            game_day: 1,
            completed_at: now,
        }];
        assert!(select_next_event(2, &templates, &done, &ChoiceDelays::new(), |_| true).is_none());
    }

    #[tokio::test]
    async fn sync_time_takes_client_clock() {
        let (service, user_id) = setup().await;
        session(&service, user_id).await;

        let game = service.sync_time(user_id, Some(2000), Some(5)).await.unwrap();
        assert_eq!((game.game_time, game.day), (2000, 5));

        let game = service.sync_time(user_id, Some(300), Some(2)).await.unwrap();
        assert_eq!((game.game_time, game.day), (300, 2));

        let game = service.sync_time(user_id, None, None).await.unwrap();
        assert_eq!((game.game_time, game.day), (START_GAME_TIME, 1));
    }

    #[test]
    fn delays_are_tracked_per_event() {
        let now = Utc::now();
        let triggered = |id: i64, key: &str, parent: &str| EventTemplate {
            id,
            key: key.into(),
            title: String::new(),
            description: String::new(),
            sort_order: 0,
            is_active: true,
            trigger_type: "triggered".into(),
            random_chance: 0.0,
            min_day: 1,
            max_day: None,
            parent_choices: parent.into(),
        };
        let done = |id: i64, event_key: &str| CompletedEvent {
            id,
            session_id: 1,
            event_key: event_key.into(),
            choice_id: "accept".into(),
            game_day: 1,
            completed_at: now,
        };
        let templates = vec![triggered(1, "follow_up", "accept")];
        let mut delays = ChoiceDelays::new();
        delays.insert(("slow_offer".into(), "accept".into()), 3);
        delays.insert(("quick_offer".into(), "accept".into()), 1);

        let slow_only = vec![done(1, "slow_offer")];
        assert!(select_next_event(2, &templates, &slow_only, &delays, |_| false).is_none());
        let picked = select_next_event(4, &templates, &slow_only, &delays, |_| false);
        assert_eq!(picked.map(|t| t.key.as_str()), Some("follow_up"));

        let quick_only = vec![done(2, "quick_offer")];
        let picked = select_next_event(2, &templates, &quick_only, &delays, |_| false);
        assert_eq!(picked.map(|t| t.key.as_str()), Some("follow_up"));
    }
}
