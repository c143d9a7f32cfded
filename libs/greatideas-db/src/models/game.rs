use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GameSession {
    pub id: i64,
    pub user_id: i64,
    pub company_name: String,
    pub industry: String,
    pub money: i64,
    pub reputation: i64,
    pub employees: i64,
    pub customers: i64,
    pub day: i64,
    pub level: i64,
    pub game_time: i64,
    pub last_event_day: i64,
    pub last_decision: String,
    pub dice_roll: i64,
    pub prototype_skill: i64,
    pub presentation_skill: i64,
    pub pitching_skill: i64,
    pub team_skill: i64,
    pub marketing_skill: i64,
    pub is_active: bool,
    pub game_over: bool,
    pub victory: bool,
    pub game_paused: bool,
    pub competition: i64,
    pub regulatory_barriers: i64,
    pub profitability: i64,
    pub entry_cost: i64,
    pub growth_potential: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GameSession {
    pub fn daily_income(&self) -> i64 {
        self.customers * 10
    }

    pub fn daily_expenses(&self) -> i64 {
        self.employees * 50
    }

    pub fn hire_cost(&self) -> i64 {
        200 + self.employees * 50
    }

    pub fn skill(&self, kind: SkillKind) -> i64 {
        match kind {
            SkillKind::Prototype => self.prototype_skill,
            SkillKind::Presentation => self.presentation_skill,
            SkillKind::Pitching => self.pitching_skill,
            SkillKind::Team => self.team_skill,
            SkillKind::Marketing => self.marketing_skill,
        }
    }

    pub fn set_skill(&mut self, kind: SkillKind, value: i64) {
        match kind {
            SkillKind::Prototype => self.prototype_skill = value,
            SkillKind::Presentation => self.presentation_skill = value,
            SkillKind::Pitching => self.pitching_skill = value,
            SkillKind::Team => self.team_skill = value,
            SkillKind::Marketing => self.marketing_skill = value,
        }
    }

    /// State handed to the game page script.
    pub fn to_json(&self) -> Value {
        let skills: Map<String, Value> = SkillKind::ALL
            .iter()
            .map(|k| (k.as_str().to_string(), json!(self.skill(*k))))
            .collect();
        json!({
            "id": self.id,
            "company_name": self.company_name,
            "industry": self.industry,
            "money": self.money,
            "reputation": self.reputation,
            "employees": self.employees,
            "customers": self.customers,
            "day": self.day,
            "level": self.level,
            "is_active": self.is_active,
            "game_over": self.game_over,
            "victory": self.victory,
            "game_time": self.game_time,
            "game_paused": self.game_paused,
            "last_event_day": self.last_event_day,
            "dice_roll": self.dice_roll,
            "skills": skills,
            "industry_profile": {
                "competition": self.competition,
                "regulatory_barriers": self.regulatory_barriers,
                "profitability": self.profitability,
                "entry_cost": self.entry_cost,
                "growth_potential": self.growth_potential,
            },
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillKind {
    Prototype,
    Presentation,
    Pitching,
    Team,
    Marketing,
}

impl SkillKind {
    pub const ALL: [SkillKind; 5] = [
        SkillKind::Prototype,
        SkillKind::Presentation,
        SkillKind::Pitching,
        SkillKind::Team,
        SkillKind::Marketing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SkillKind::Prototype => "prototype",
            SkillKind::Presentation => "presentation",
            SkillKind::Pitching => "pitching",
            SkillKind::Team => "team",
            SkillKind::Marketing => "marketing",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.as_str() == value)
    }

    /// Column on `game_sessions` holding this skill.
    pub fn session_field(&self) -> &'static str {
        match self {
            SkillKind::Prototype => "prototype_skill",
            SkillKind::Presentation => "presentation_skill",
            SkillKind::Pitching => "pitching_skill",
            SkillKind::Team => "team_skill",
            SkillKind::Marketing => "marketing_skill",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Industry {
    It,
    Food,
    Retail,
    Health,
    Education,
}

/// Market characteristics of an industry, each on a 1-10 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndustryProfile {
    pub competition: i64,
    pub regulatory_barriers: i64,
    pub profitability: i64,
    pub entry_cost: i64,
    pub growth_potential: i64,
}

impl Industry {
    pub const ALL: [Industry; 5] = [
        Industry::It,
        Industry::Food,
        Industry::Retail,
        Industry::Health,
        Industry::Education,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Industry::It => "IT",
            Industry::Food => "FOOD",
            Industry::Retail => "RETAIL",
            Industry::Health => "HEALTH",
            Industry::Education => "EDUCATION",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Industry::It => "Информационные технологии",
            Industry::Food => "Еда и рестораны",
            Industry::Retail => "Розничная торговля",
            Industry::Health => "Здравоохранение",
            Industry::Education => "Образование",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|i| i.code().eq_ignore_ascii_case(value))
    }

    pub fn profile(&self) -> IndustryProfile {
        let (competition, regulatory_barriers, profitability, entry_cost, growth_potential) = match self {
            Industry::It => (8, 3, 7, 4, 9),
            Industry::Food => (7, 6, 5, 6, 5),
            Industry::Retail => (9, 4, 4, 5, 4),
            Industry::Health => (5, 9, 8, 8, 7),
            Industry::Education => (4, 7, 5, 3, 6),
        };
        IndustryProfile {
            competition,
            regulatory_barriers,
            profitability,
            entry_cost,
            growth_potential,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GameEvent {
    pub id: i64,
    pub session_id: i64,
    pub event_type: String,
    pub title: String,
    pub description: String,
    pub day_occurred: i64,
    pub money_change: i64,
    pub reputation_change: i64,
    pub employees_change: i64,
    pub customers_change: i64,
    pub created_at: DateTime<Utc>,
}

/// Event log entry before insertion.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NewGameEvent {
    pub event_type: String,
    pub title: String,
    pub description: String,
    pub money_change: i64,
    pub reputation_change: i64,
    pub employees_change: i64,
    pub customers_change: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Achievement {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub required_money: Option<i64>,
    pub required_reputation: Option<i64>,
    pub required_employees: Option<i64>,
    pub required_customers: Option<i64>,
    pub required_day: Option<i64>,
    pub required_level: Option<i64>,
}

impl Achievement {
    /// All set thresholds are met. An achievement with no thresholds is never earned.
    pub fn is_met_by(&self, s: &GameSession) -> bool {
        let checks = [
            (self.required_money, s.money),
            (self.required_reputation, s.reputation),
            (self.required_employees, s.employees),
            (self.required_customers, s.customers),
            (self.required_day, s.day),
            (self.required_level, s.level),
        ];
        let mut any = false;
        for (required, actual) in checks {
            if let Some(required) = required {
                any = true;
                if actual < required {
                    return false;
                }
            }
        }
        any
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct EarnedAchievement {
    pub achievement_id: i64,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub session_id: i64,
    pub earned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Skill {
    pub id: i64,
    pub name: String,
    pub display_name: String,
    pub color: String,
    pub icon: String,
    pub description: String,
    pub session_field: String,
    pub sort_order: i64,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EventTemplate {
    pub id: i64,
    pub key: String,
    pub title: String,
    pub description: String,
    pub sort_order: i64,
    pub is_active: bool,
    pub trigger_type: String,
    pub random_chance: f64,
    pub min_day: i64,
    pub max_day: Option<i64>,
    pub parent_choices: String,
}

impl EventTemplate {
    pub fn parent_choice_ids(&self) -> Vec<&str> {
        split_list(&self.parent_choices)
    }

    pub fn in_day_range(&self, day: i64) -> bool {
        day >= self.min_day && self.max_day.is_none_or(|max| day <= max)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EventChoice {
    pub id: i64,
    pub template_id: i64,
    pub choice_id: String,
    pub title: String,
    pub description: String,
    pub time_cost: i64,
    pub money_cost: i64,
    pub money_effect: i64,
    pub reputation_effect: i64,
    pub employees_effect: i64,
    pub customers_effect: i64,
    pub prototype_effect: i64,
    pub presentation_effect: i64,
    pub pitching_effect: i64,
    pub team_effect: i64,
    pub marketing_effect: i64,
    pub button_style: String,
    pub sort_order: i64,
    pub next_events: String,
    pub next_event_delay: i64,
}

impl EventChoice {
    /// Non-zero effects keyed the way the game script reads them.
    pub fn effects(&self) -> Map<String, Value> {
        [
            ("money", self.money_effect),
            ("reputation", self.reputation_effect),
            ("employees", self.employees_effect),
            ("customers", self.customers_effect),
            ("prototype_skill", self.prototype_effect),
            ("presentation_skill", self.presentation_effect),
            ("pitching_skill", self.pitching_effect),
            ("team_skill", self.team_effect),
            ("marketing_skill", self.marketing_effect),
        ]
        .into_iter()
        .filter(|(_, v)| *v != 0)
        .map(|(k, v)| (k.to_string(), json!(v)))
        .collect()
    }

    pub fn skill_effect(&self, kind: SkillKind) -> i64 {
        match kind {
            SkillKind::Prototype => self.prototype_effect,
            SkillKind::Presentation => self.presentation_effect,
            SkillKind::Pitching => self.pitching_effect,
            SkillKind::Team => self.team_effect,
            SkillKind::Marketing => self.marketing_effect,
        }
    }

    pub fn next_event_keys(&self) -> Vec<&str> {
        split_list(&self.next_events)
    }
}

/// Definition of a choice used when seeding templates.
#[derive(Debug, Clone, Default)]
pub struct ChoiceSeed {
    pub choice_id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub time_cost: i64,
    pub money_cost: i64,
    pub money_effect: i64,
    pub reputation_effect: i64,
    pub employees_effect: i64,
    pub customers_effect: i64,
    pub prototype_effect: i64,
    pub presentation_effect: i64,
    pub pitching_effect: i64,
    pub team_effect: i64,
    pub marketing_effect: i64,
    pub button_style: &'static str,
    pub skills: Vec<&'static str>,
    pub next_events: &'static str,
    pub next_event_delay: i64,
}

/// Definition of an event template used when seeding.
#[derive(Debug, Clone)]
pub struct TemplateSeed {
    pub key: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub sort_order: i64,
    pub trigger_type: &'static str,
    pub random_chance: f64,
    pub min_day: i64,
    pub max_day: Option<i64>,
    pub parent_choices: &'static str,
}

impl Default for TemplateSeed {
    fn default() -> Self {
        Self {
            key: "",
            title: "",
            description: "",
            sort_order: 0,
            trigger_type: "sequential",
            random_chance: 0.1,
            min_day: 1,
            max_day: None,
            parent_choices: "",
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewGameSession {
    pub company_name: String,
    pub industry: Industry,
    pub money: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CompletedEvent {
    pub id: i64,
    pub session_id: i64,
    pub event_key: String,
    pub choice_id: String,
    pub game_day: i64,
    pub completed_at: DateTime<Utc>,
}

fn split_list(raw: &str) -> Vec<&str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn achievement() -> Achievement {
        Achievement {
            id: 1,
            name: "Первая тысяча".into(),
            description: String::new(),
            icon: "fas fa-trophy".into(),
            required_money: Some(1000),
            required_reputation: None,
            required_employees: Some(2),
            required_customers: None,
            required_day: None,
            required_level: None,
        }
    }

    #[test]
    fn industries_parse_case_insensitively() {
        assert_eq!(Industry::parse("food"), Some(Industry::Food));
        assert_eq!(Industry::parse("IT"), Some(Industry::It));
        assert_eq!(Industry::parse("SPACE"), None);
        assert!(Industry::ALL.iter().all(|i| {
            let p = i.profile();
            [p.competition, p.regulatory_barriers, p.profitability, p.entry_cost, p.growth_potential]
                .iter()
                .all(|v| (1..=10).contains(v))
        }));
    }

    #[test]
    fn skill_kinds_round_trip_names() {
        for kind in SkillKind::ALL {
            assert_eq!(SkillKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(SkillKind::parse("charisma"), None);
    }

    #[test]
    fn list_fields_ignore_blanks() {
        assert_eq!(split_list("a, b,,c "), vec!["a", "b", "c"]);
        assert!(split_list("").is_empty());
    }

    #[test]
    fn achievement_without_thresholds_is_never_met() {
        let mut a = achievement();
        a.required_money = None;
        a.required_employees = None;
        assert!(!a.is_met_by(&sample_session(5000, 5)));
    }

    #[test]
    fn achievement_requires_every_threshold() {
        let a = achievement();
        assert!(a.is_met_by(&sample_session(1000, 2)));
        assert!(!a.is_met_by(&sample_session(999, 5)));
        assert!(!a.is_met_by(&sample_session(5000, 1)));
    }

    fn sample_session(money: i64, employees: i64) -> GameSession {
        let now = Utc::now();
        GameSession {
            id: 1,
            user_id: 1,
            company_name: "My Startup".into(),
            industry: "IT".into(),
            money,
            reputation: 0,
            employees,
            customers: 0,
            day: 1,
            level: 1,
            game_time: 480,
            last_event_day: 0,
            last_decision: String::new(),
            dice_roll: 1,
            prototype_skill: 0,
            presentation_skill: 0,
            pitching_skill: 0,
            team_skill: 0,
            marketing_skill: 0,
            is_active: true,
            game_over: false,
            victory: false,
            game_paused: false,
            competition: 5,
            regulatory_barriers: 5,
            profitability: 5,
            entry_cost: 5,
            growth_potential: 5,
            created_at: now,
            updated_at: now,
        }
    }
}
