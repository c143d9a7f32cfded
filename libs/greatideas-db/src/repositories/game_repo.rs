use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Executor, QueryBuilder, Sqlite, SqlitePool};
use std::collections::HashMap;

use crate::models::game::{
    Achievement, ChoiceSeed, CompletedEvent, EarnedAchievement, EventChoice, EventTemplate, GameEvent,
    GameSession, NewGameEvent, NewGameSession, Skill, TemplateSeed,
};

#[derive(Debug, Clone)]
pub struct GameRepository {
    pool: SqlitePool,
}

impl GameRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // Sessions

    /// Deactivates the user's running sessions and starts a fresh one.
    pub async fn start_session(&self, user_id: i64, new: &NewGameSession) -> Result<GameSession> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        let profile = new.industry.profile();

        sqlx::query("UPDATE game_sessions SET is_active = 0, updated_at = ? WHERE user_id = ? AND is_active = 1")
            .bind(now)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .context("Failed to deactivate game sessions")?;

        let session = sqlx::query_as::<_, GameSession>(
            r#"
            INSERT INTO game_sessions (user_id, company_name, industry, money, competition, regulatory_barriers,
                                       profitability, entry_cost, growth_potential, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(&new.company_name)
        .bind(new.industry.code())
        .bind(new.money)
        .bind(profile.competition)
        .bind(profile.regulatory_barriers)
        .bind(profile.profitability)
        .bind(profile.entry_cost)
        .bind(profile.growth_potential)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to create game session")?;

        tx.commit().await?;
        Ok(session)
    }

    pub async fn active_for_user(&self, user_id: i64) -> Result<Option<GameSession>> {
        sqlx::query_as::<_, GameSession>(
            "SELECT * FROM game_sessions WHERE user_id = ? AND is_active = 1 ORDER BY updated_at DESC, id DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch active game session")
    }

    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<GameSession>> {
        sqlx::query_as::<_, GameSession>(
            "SELECT * FROM game_sessions WHERE user_id = ? ORDER BY updated_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch game sessions")
    }

    /// Writes every mutable field of the session back.
    pub async fn save(&self, s: &GameSession) -> Result<GameSession> {
        Self::save_with(&self.pool, s).await
    }

    async fn save_with<'e, E>(executor: E, s: &GameSession) -> Result<GameSession>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, GameSession>(
            r#"
            UPDATE game_sessions SET
                company_name = ?, money = ?, reputation = ?, employees = ?, customers = ?, day = ?, level = ?,
                game_time = ?, last_event_day = ?, last_decision = ?, dice_roll = ?,
                prototype_skill = ?, presentation_skill = ?, pitching_skill = ?, team_skill = ?, marketing_skill = ?,
                is_active = ?, game_over = ?, victory = ?, game_paused = ?, updated_at = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(&s.company_name)
        .bind(s.money)
        .bind(s.reputation)
        .bind(s.employees)
        .bind(s.customers)
        .bind(s.day)
        .bind(s.level)
        .bind(s.game_time)
        .bind(s.last_event_day)
        .bind(&s.last_decision)
        .bind(s.dice_roll)
        .bind(s.prototype_skill)
        .bind(s.presentation_skill)
        .bind(s.pitching_skill)
        .bind(s.team_skill)
        .bind(s.marketing_skill)
        .bind(s.is_active)
        .bind(s.game_over)
        .bind(s.victory)
        .bind(s.game_paused)
        .bind(Utc::now())
        .bind(s.id)
        .fetch_one(executor)
        .await
        .context("Failed to save game session")
    }

    // Event log

    pub async fn log_event(&self, session_id: i64, day: i64, event: &NewGameEvent) -> Result<GameEvent> {
        Self::log_event_with(&self.pool, session_id, day, event).await
    }

    async fn log_event_with<'e, E>(executor: E, session_id: i64, day: i64, event: &NewGameEvent) -> Result<GameEvent>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, GameEvent>(
            r#"
            INSERT INTO game_events (session_id, event_type, title, description, day_occurred, money_change,
                                     reputation_change, employees_change, customers_change, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(session_id)
        .bind(&event.event_type)
        .bind(&event.title)
        .bind(&event.description)
        .bind(day)
        .bind(event.money_change)
        .bind(event.reputation_change)
        .bind(event.employees_change)
        .bind(event.customers_change)
        .bind(Utc::now())
        .fetch_one(executor)
        .await
        .context("Failed to log game event")
    }

    pub async fn events_for_session(&self, session_id: i64) -> Result<Vec<GameEvent>> {
        sqlx::query_as::<_, GameEvent>(
            "SELECT * FROM game_events WHERE session_id = ? ORDER BY day_occurred DESC, id DESC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch game events")
    }

    // Achievements

    pub async fn upsert_achievement(&self, a: &Achievement) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO achievements (name, description, icon, required_money, required_reputation,
                                      required_employees, required_customers, required_day, required_level)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                description = excluded.description, icon = excluded.icon,
                required_money = excluded.required_money, required_reputation = excluded.required_reputation,
                required_employees = excluded.required_employees, required_customers = excluded.required_customers,
                required_day = excluded.required_day, required_level = excluded.required_level
            "#,
        )
        .bind(&a.name)
        .bind(&a.description)
        .bind(&a.icon)
        .bind(a.required_money)
        .bind(a.required_reputation)
        .bind(a.required_employees)
        .bind(a.required_customers)
        .bind(a.required_day)
        .bind(a.required_level)
        .execute(&self.pool)
        .await
        .context("Failed to upsert achievement")?;
        Ok(())
    }

    /// Achievements the user does not hold yet.
    pub async fn unearned_achievements(&self, user_id: i64) -> Result<Vec<Achievement>> {
        sqlx::query_as::<_, Achievement>(
            r#"
            SELECT * FROM achievements a
            WHERE NOT EXISTS (
                SELECT 1 FROM user_achievements ua WHERE ua.achievement_id = a.id AND ua.user_id = ?
            )
            ORDER BY a.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch unearned achievements")
    }

    /// Returns `false` when the user already held the achievement.
    pub async fn award(&self, user_id: i64, achievement_id: i64, session_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO user_achievements (user_id, achievement_id, session_id, earned_at) VALUES (?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(achievement_id)
        .bind(session_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("Failed to award achievement")?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn earned_for_user(&self, user_id: i64) -> Result<Vec<EarnedAchievement>> {
        sqlx::query_as::<_, EarnedAchievement>(
            r#"
            SELECT ua.achievement_id, a.name, a.description, a.icon, ua.session_id, ua.earned_at
            FROM user_achievements ua
            JOIN achievements a ON a.id = ua.achievement_id
            WHERE ua.user_id = ?
            ORDER BY ua.earned_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch user achievements")
    }

    // Skills and event content

    pub async fn upsert_skill(&self, skill: &Skill) -> Result<Skill> {
        sqlx::query_as::<_, Skill>(
            r#"
            INSERT INTO skills (name, display_name, color, icon, description, session_field, sort_order, is_active)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                display_name = excluded.display_name, color = excluded.color, icon = excluded.icon,
                description = excluded.description, session_field = excluded.session_field,
                sort_order = excluded.sort_order, is_active = excluded.is_active
            RETURNING *
            "#,
        )
        .bind(&skill.name)
        .bind(&skill.display_name)
        .bind(&skill.color)
        .bind(&skill.icon)
        .bind(&skill.description)
        .bind(&skill.session_field)
        .bind(skill.sort_order)
        .bind(skill.is_active)
        .fetch_one(&self.pool)
        .await
        .context("Failed to upsert skill")
    }

    pub async fn active_skills(&self) -> Result<Vec<Skill>> {
        sqlx::query_as::<_, Skill>("SELECT * FROM skills WHERE is_active = 1 ORDER BY sort_order, name")
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch skills")
    }

    pub async fn upsert_template(&self, t: &TemplateSeed) -> Result<EventTemplate> {
        sqlx::query_as::<_, EventTemplate>(
            r#"
            INSERT INTO event_templates (key, title, description, sort_order, trigger_type, random_chance,
                                         min_day, max_day, parent_choices)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                title = excluded.title, description = excluded.description, sort_order = excluded.sort_order,
                trigger_type = excluded.trigger_type, random_chance = excluded.random_chance,
                min_day = excluded.min_day, max_day = excluded.max_day, parent_choices = excluded.parent_choices
            RETURNING *
            "#,
        )
        .bind(t.key)
        .bind(t.title)
        .bind(t.description)
        .bind(t.sort_order)
        .bind(t.trigger_type)
        .bind(t.random_chance)
        .bind(t.min_day)
        .bind(t.max_day)
        .bind(t.parent_choices)
        .fetch_one(&self.pool)
        .await
        .context("Failed to upsert event template")
    }

    /// Creates or refreshes a choice and replaces its skill links.
    pub async fn upsert_choice(&self, template_id: i64, sort_order: i64, c: &ChoiceSeed) -> Result<EventChoice> {
        let mut tx = self.pool.begin().await?;

        let choice = sqlx::query_as::<_, EventChoice>(
            r#"
            INSERT INTO event_choices (template_id, choice_id, title, description, time_cost, money_cost,
                                       money_effect, reputation_effect, employees_effect, customers_effect,
                                       prototype_effect, presentation_effect, pitching_effect, team_effect,
                                       marketing_effect, button_style, sort_order, next_events, next_event_delay)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(template_id, choice_id) DO UPDATE SET
                title = excluded.title, description = excluded.description, time_cost = excluded.time_cost,
                money_cost = excluded.money_cost, money_effect = excluded.money_effect,
                reputation_effect = excluded.reputation_effect, employees_effect = excluded.employees_effect,
                customers_effect = excluded.customers_effect, prototype_effect = excluded.prototype_effect,
                presentation_effect = excluded.presentation_effect, pitching_effect = excluded.pitching_effect,
                team_effect = excluded.team_effect, marketing_effect = excluded.marketing_effect,
                button_style = excluded.button_style, sort_order = excluded.sort_order,
                next_events = excluded.next_events, next_event_delay = excluded.next_event_delay
            RETURNING *
            "#,
        )
        .bind(template_id)
        .bind(c.choice_id)
        .bind(c.title)
        .bind(c.description)
        .bind(c.time_cost)
        .bind(c.money_cost)
        .bind(c.money_effect)
        .bind(c.reputation_effect)
        .bind(c.employees_effect)
        .bind(c.customers_effect)
        .bind(c.prototype_effect)
        .bind(c.presentation_effect)
        .bind(c.pitching_effect)
        .bind(c.team_effect)
        .bind(c.marketing_effect)
        .bind(if c.button_style.is_empty() { "primary" } else { c.button_style })
        .bind(sort_order)
        .bind(c.next_events)
        .bind(c.next_event_delay.max(1))
        .fetch_one(&mut *tx)
        .await
        .context("Failed to upsert event choice")?;

        sqlx::query("DELETE FROM event_choice_skills WHERE choice_id = ?")
            .bind(choice.id)
            .execute(&mut *tx)
            .await
            .context("Failed to clear choice skills")?;

        for skill_name in &c.skills {
            sqlx::query(
                "INSERT OR IGNORE INTO event_choice_skills (choice_id, skill_id) SELECT ?, id FROM skills WHERE name = ?",
            )
            .bind(choice.id)
            .bind(skill_name)
            .execute(&mut *tx)
            .await
            .context("Failed to link choice skill")?;
        }

        tx.commit().await?;
        Ok(choice)
    }

    pub async fn active_templates(&self) -> Result<Vec<EventTemplate>> {
        sqlx::query_as::<_, EventTemplate>("SELECT * FROM event_templates WHERE is_active = 1 ORDER BY sort_order, id")
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch event templates")
    }

    pub async fn count_templates(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM event_templates")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count event templates")
    }

    /// Choices of the given templates keyed by template id, in display order.
    pub async fn choices_by_template(&self, template_ids: &[i64]) -> Result<HashMap<i64, Vec<EventChoice>>> {
        if template_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM event_choices WHERE template_id IN (");
        let mut separated = qb.separated(", ");
        for id in template_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY sort_order, id");

        let choices = qb
            .build_query_as::<EventChoice>()
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch event choices")?;

        let mut map: HashMap<i64, Vec<EventChoice>> = HashMap::new();
        for c in choices {
            map.entry(c.template_id).or_default().push(c);
        }
        Ok(map)
    }

    /// Active skills linked to each choice, keyed by choice row id.
    pub async fn skills_by_choice(&self) -> Result<HashMap<i64, Vec<Skill>>> {
        #[derive(sqlx::FromRow)]
        struct Row {
            link_choice_id: i64,
            #[sqlx(flatten)]
            skill: Skill,
        }

        let rows = sqlx::query_as::<_, Row>(
            r#"
            SELECT l.choice_id AS link_choice_id, s.*
            FROM event_choice_skills l
            JOIN skills s ON s.id = l.skill_id
            WHERE s.is_active = 1
            ORDER BY s.sort_order, s.name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch choice skills")?;

        let mut map: HashMap<i64, Vec<Skill>> = HashMap::new();
        for row in rows {
            map.entry(row.link_choice_id).or_default().push(row.skill);
        }
        Ok(map)
    }

    pub async fn find_choice(&self, event_key: &str, choice_id: &str) -> Result<Option<(EventTemplate, EventChoice)>> {
        let Some(template) = sqlx::query_as::<_, EventTemplate>("SELECT * FROM event_templates WHERE key = ?")
            .bind(event_key)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch event template")?
        else {
            return Ok(None);
        };

        let choice = sqlx::query_as::<_, EventChoice>(
            "SELECT * FROM event_choices WHERE template_id = ? AND choice_id = ?",
        )
        .bind(template.id)
        .bind(choice_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch event choice")?;

        Ok(choice.map(|c| (template, c)))
    }

    // Completed events

    /// Returns `false` if the event was already completed in this session.
    pub async fn record_completed(&self, session_id: i64, event_key: &str, choice_id: &str, day: i64) -> Result<bool> {
        Self::record_completed_with(&self.pool, session_id, event_key, choice_id, day).await
    }

    async fn record_completed_with<'e, E>(
        executor: E,
        session_id: i64,
        event_key: &str,
        choice_id: &str,
        day: i64,
    ) -> Result<bool>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO completed_events (session_id, event_key, choice_id, game_day, completed_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(event_key)
        .bind(choice_id)
        .bind(day)
        .bind(Utc::now())
        .execute(executor)
        .await
        .context("Failed to record completed event")?;
        Ok(result.rows_affected() > 0)
    }

    /// Marks `event_key` completed, logs the decision and saves the session in one
    /// transaction. Returns `None` when the event was already completed, in which
    /// case nothing is written.
    pub async fn commit_choice(
        &self,
        session: &GameSession,
        event_key: &str,
        choice_id: &str,
        log: &NewGameEvent,
    ) -> Result<Option<GameSession>> {
        let mut tx = self.pool.begin().await?;

        if !Self::record_completed_with(&mut *tx, session.id, event_key, choice_id, session.day).await? {
            return Ok(None);
        }
        Self::log_event_with(&mut *tx, session.id, session.day, log).await?;
        let saved = Self::save_with(&mut *tx, session).await?;

        tx.commit().await.context("Failed to commit game choice")?;
        Ok(Some(saved))
    }

    pub async fn completed_for_session(&self, session_id: i64) -> Result<Vec<CompletedEvent>> {
        sqlx::query_as::<_, CompletedEvent>(
            "SELECT * FROM completed_events WHERE session_id = ? ORDER BY game_day, id",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch completed events")
    }
}
