use anyhow::Result;
use greatideas_db::models::game::{Achievement, ChoiceSeed, SkillKind, Skill, TemplateSeed};
use greatideas_db::repositories::GameRepository;
use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContentStats {
    pub skills: usize,
    pub events: usize,
    pub choices: usize,
    pub achievements: usize,
}

fn skills() -> Vec<Skill> {
    let rows = [
        (SkillKind::Prototype, "Разработка прототипа", "#28a745", "⚙️", "Навык создания прототипов и MVP"),
        (SkillKind::Presentation, "Презентации", "#007bff", "📊", "Навык создания и проведения презентаций"),
        (SkillKind::Pitching, "Питчинг", "#ffc107", "🎯", "Навык питчинга идей инвесторам"),
        (SkillKind::Team, "Тимбилдинг", "#6f42c1", "👥", "Навык работы с командой и найма сотрудников"),
        (SkillKind::Marketing, "Маркетинг", "#dc3545", "📈", "Навык продвижения и маркетинга"),
    ];
    rows.into_iter()
        .zip(1..)
        .map(|((kind, display_name, color, icon, description), sort_order)| Skill {
            id: 0,
            name: kind.as_str().to_string(),
            display_name: display_name.to_string(),
            color: color.to_string(),
            icon: icon.to_string(),
            description: description.to_string(),
            session_field: kind.session_field().to_string(),
            sort_order,
            is_active: true,
        })
        .collect()
}

fn events() -> Vec<(TemplateSeed, Vec<ChoiceSeed>)> {
    vec![
        (
            TemplateSeed {
                key: "first_idea",
                title: "Первая идея",
                description: "У вас появилась отличная идея для стартапа! Как вы хотите её развивать?",
                sort_order: 1,
                ..Default::default()
            },
            vec![
                ChoiceSeed {
                    choice_id: "research",
                    title: "Провести исследование рынка",
                    description: "Изучить конкурентов и потребности клиентов",
                    time_cost: 2,
                    money_cost: 100,
                    reputation_effect: 5,
                    button_style: "btn-info",
                    skills: vec!["marketing"],
                    ..Default::default()
                },
                ChoiceSeed {
                    choice_id: "prototype",
                    title: "Сразу делать прототип",
                    description: "Начать разработку минимального продукта",
                    time_cost: 3,
                    money_cost: 200,
                    prototype_effect: 10,
                    button_style: "btn-success",
                    skills: vec!["prototype"],
                    ..Default::default()
                },
                ChoiceSeed {
                    choice_id: "team",
                    title: "Найти со-основателя",
                    description: "Поискать партнера для реализации идеи",
                    time_cost: 1,
                    employees_effect: 1,
                    button_style: "btn-warning",
                    skills: vec!["team"],
                    ..Default::default()
                },
            ],
        ),
        (
            TemplateSeed {
                key: "presentation_event",
                title: "Презентация проекта",
                description: "Вам нужно представить ваш проект. Выберите формат презентации.",
                sort_order: 2,
                ..Default::default()
            },
            vec![
                ChoiceSeed {
                    choice_id: "formal_presentation",
                    title: "Формальная презентация",
                    description: "Подготовить детальную презентацию со слайдами",
                    time_cost: 2,
                    money_cost: 50,
                    presentation_effect: 15,
                    reputation_effect: 10,
                    button_style: "btn-primary",
                    skills: vec!["presentation"],
                    ..Default::default()
                },
                ChoiceSeed {
                    choice_id: "pitch_demo",
                    title: "Питч с демо",
                    description: "Показать рабочий прототип и рассказать о продукте",
                    time_cost: 1,
                    pitching_effect: 10,
                    prototype_effect: 5,
                    customers_effect: 2,
                    button_style: "btn-success",
                    skills: vec!["pitching", "prototype"],
                    ..Default::default()
                },
                ChoiceSeed {
                    choice_id: "informal_meeting",
                    title: "Неформальная встреча",
                    description: "Организовать встречу в кафе для обсуждения идеи",
                    time_cost: 1,
                    money_cost: 25,
                    reputation_effect: 3,
                    team_effect: 5,
                    button_style: "btn-secondary",
                    skills: vec!["team"],
                    ..Default::default()
                },
            ],
        ),
        (
            TemplateSeed {
                key: "funding_search",
                title: "Поиск финансирования",
                description: "Деньги заканчиваются. Как будете искать финансирование?",
                sort_order: 3,
                ..Default::default()
            },
            vec![
                ChoiceSeed {
                    choice_id: "angel_investors",
                    title: "Ангельские инвесторы",
                    description: "Найти частных инвесторов для раннего этапа",
                    time_cost: 3,
                    money_cost: 100,
                    money_effect: 5000,
                    pitching_effect: 20,
                    button_style: "btn-warning",
                    skills: vec!["pitching", "presentation"],
                    ..Default::default()
                },
                ChoiceSeed {
                    choice_id: "crowdfunding",
                    title: "Краудфандинг",
                    description: "Запустить кампанию на краудфандинговой платформе",
                    time_cost: 2,
                    money_cost: 200,
                    money_effect: 2000,
                    customers_effect: 10,
                    button_style: "btn-info",
                    skills: vec!["marketing", "presentation"],
                    ..Default::default()
                },
                ChoiceSeed {
                    choice_id: "bootstrap",
                    title: "Развиваться самостоятельно",
                    description: "Экономить и развиваться на собственные средства",
                    time_cost: 1,
                    money_effect: 500,
                    reputation_effect: 5,
                    button_style: "btn-secondary",
                    skills: vec!["prototype", "team"],
                    ..Default::default()
                },
            ],
        ),
        (
            TemplateSeed {
                key: "product_development",
                title: "Развитие продукта",
                description: "Пора улучшать продукт. На чем сосредоточиться?",
                sort_order: 4,
                ..Default::default()
            },
            vec![
                ChoiceSeed {
                    choice_id: "new_features",
                    title: "Новые функции",
                    description: "Добавить новые возможности в продукт",
                    time_cost: 3,
                    money_cost: 300,
                    prototype_effect: 15,
                    customers_effect: 5,
                    button_style: "btn-success",
                    skills: vec!["prototype"],
                    ..Default::default()
                },
                ChoiceSeed {
                    choice_id: "user_experience",
                    title: "Улучшить UX",
                    description: "Сосредоточиться на удобстве использования",
                    time_cost: 2,
                    money_cost: 150,
                    prototype_effect: 10,
                    customers_effect: 8,
                    reputation_effect: 5,
                    button_style: "btn-primary",
                    skills: vec!["prototype", "marketing"],
                    ..Default::default()
                },
                ChoiceSeed {
                    choice_id: "marketing_push",
                    title: "Маркетинговая кампания",
                    description: "Сосредоточиться на привлечении клиентов",
                    time_cost: 2,
                    money_cost: 400,
                    customers_effect: 15,
                    reputation_effect: 10,
                    button_style: "btn-danger",
                    skills: vec!["marketing", "presentation"],
                    ..Default::default()
                },
            ],
        ),
        (
            TemplateSeed {
                key: "team_expansion",
                title: "Расширение команды",
                description: "Компания растет! Кого нанять в первую очередь?",
                sort_order: 5,
                ..Default::default()
            },
            vec![
                ChoiceSeed {
                    choice_id: "developer",
                    title: "Разработчика",
                    description: "Нанять опытного программиста",
                    time_cost: 2,
                    money_cost: 500,
                    employees_effect: 1,
                    prototype_effect: 10,
                    button_style: "btn-success",
                    skills: vec!["prototype", "team"],
                    ..Default::default()
                },
                ChoiceSeed {
                    choice_id: "marketer",
                    title: "Маркетолога",
                    description: "Нанять специалиста по маркетингу",
                    time_cost: 2,
                    money_cost: 400,
                    employees_effect: 1,
                    customers_effect: 8,
                    button_style: "btn-danger",
                    skills: vec!["marketing", "team"],
                    ..Default::default()
                },
                ChoiceSeed {
                    choice_id: "sales_manager",
                    title: "Менеджера по продажам",
                    description: "Нанять человека для работы с клиентами",
                    time_cost: 1,
                    money_cost: 350,
                    employees_effect: 1,
                    customers_effect: 10,
                    money_effect: 200,
                    button_style: "btn-warning",
                    skills: vec!["pitching", "team"],
                    ..Default::default()
                },
            ],
        ),
    ]
}

fn achievements() -> Vec<Achievement> {
    let row = |name: &str, description: &str, icon: &str| Achievement {
        id: 0,
        name: name.to_string(),
        description: description.to_string(),
        icon: icon.to_string(),
        required_money: None,
        required_reputation: None,
        required_employees: None,
        required_customers: None,
        required_day: None,
        required_level: None,
    };
    vec![
        Achievement {
            required_money: Some(1000),
            ..row("Первая тысяча", "Накопите 1000$ на счету компании", "fas fa-coins")
        },
        Achievement {
            required_money: Some(10000),
            ..row("Инвесторы довольны", "Накопите 10000$", "fas fa-sack-dollar")
        },
        Achievement {
            required_employees: Some(5),
            ..row("Команда мечты", "Наймите пятерых сотрудников", "fas fa-users")
        },
        Achievement {
            required_customers: Some(100),
            ..row("Сотня клиентов", "Привлеките 100 клиентов", "fas fa-user-check")
        },
        Achievement {
            required_reputation: Some(50),
            ..row("Известный бренд", "Поднимите репутацию до 50", "fas fa-star")
        },
        Achievement {
            required_day: Some(30),
            ..row("Месяц на рынке", "Продержитесь 30 дней", "fas fa-calendar-check")
        },
    ]
}

/// Upserts the skills, starter events and achievements. Safe to run repeatedly.
pub async fn load_test_events(repo: &GameRepository) -> Result<ContentStats> {
    let mut stats = ContentStats::default();

    for skill in skills() {
        repo.upsert_skill(&skill).await?;
        stats.skills += 1;
    }

    for (template, choices) in events() {
        let saved = repo.upsert_template(&template).await?;
        for (choice, sort_order) in choices.iter().zip(1..) {
            repo.upsert_choice(saved.id, sort_order, choice).await?;
            stats.choices += 1;
        }
        stats.events += 1;
    }

    for achievement in achievements() {
        repo.upsert_achievement(&achievement).await?;
        stats.achievements += 1;
    }

    info!(
        "Game content loaded: {} skills, {} events, {} choices, {} achievements",
        stats.skills, stats.events, stats.choices, stats.achievements
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loading_twice_keeps_one_copy() {
        let pool = greatideas_db::connect_memory().await.unwrap();
        let repo = GameRepository::new(pool);

        let first = load_test_events(&repo).await.unwrap();
        let second = load_test_events(&repo).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.events, 5);
        assert_eq!(first.choices, 15);

        assert_eq!(repo.count_templates().await.unwrap(), 5);
        assert_eq!(repo.active_skills().await.unwrap().len(), 5);

        let (_, pitch) = repo.find_choice("presentation_event", "pitch_demo").await.unwrap().unwrap();
        let skills = repo.skills_by_choice().await.unwrap();
        let names: Vec<_> = skills[&pitch.id].iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["prototype", "pitching"]);
    }
}
