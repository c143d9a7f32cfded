use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use greatideas_db::models::cafe::Cafe;
use greatideas_db::models::menu::MenuItem;
use greatideas_shared::money::format_rub;
use tracing::error;

use super::{script_json, PageContext};
use crate::services::menu_service::CafeMenu;
use crate::services::session_service::SessionHandle;
use crate::AppState;

#[derive(Template, WebTemplate)]
#[template(path = "home.html")]
pub struct HomeTemplate {
    pub page: PageContext,
    pub cafes_count: i64,
}

#[derive(Template, WebTemplate)]
#[template(path = "cafe_list.html")]
pub struct CafeListTemplate {
    pub page: PageContext,
    pub cafes: Vec<CafeCard>,
}

#[derive(Template, WebTemplate)]
#[template(path = "cafe_detail.html")]
pub struct CafeDetailTemplate {
    pub page: PageContext,
    pub cafe: CafeCard,
    pub sections: Vec<SectionView>,
    pub popular: Option<ItemView>,
    pub addon_groups: Vec<String>,
    pub addons_count: usize,
    pub cafes_count: i64,
    pub menu_json: String,
}

#[derive(Template, WebTemplate)]
#[template(path = "not_found.html")]
pub struct NotFoundTemplate {
    pub page: PageContext,
    pub message: String,
}

pub struct CafeCard {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub address: String,
    pub phone: String,
    pub working_hours: String,
    pub logo: Option<String>,
    pub min_order: Option<String>,
    pub delivery_fee: Option<String>,
}

impl From<&Cafe> for CafeCard {
    fn from(cafe: &Cafe) -> Self {
        Self {
            id: cafe.id,
            name: cafe.name.clone(),
            description: cafe.description.clone(),
            address: cafe.address.clone(),
            phone: cafe.phone.clone(),
            working_hours: cafe.working_hours.clone(),
            logo: cafe.logo.clone(),
            min_order: (cafe.min_order_amount > 0).then(|| format_rub(cafe.min_order_amount)),
            delivery_fee: (cafe.delivery_fee > 0).then(|| format_rub(cafe.delivery_fee)),
        }
    }
}

pub struct ItemView {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub price: String,
    pub weight: String,
    pub image: Option<String>,
    pub is_popular: bool,
}

impl From<&MenuItem> for ItemView {
    fn from(item: &MenuItem) -> Self {
        Self {
            id: item.id,
            name: item.name.clone(),
            description: item.description.clone(),
            price: format_rub(item.price),
            weight: item.weight.clone(),
            image: item.image.clone(),
            is_popular: item.is_popular,
        }
    }
}

pub struct SectionView {
    pub id: i64,
    pub name: String,
    pub count: usize,
    pub items: Vec<ItemView>,
}

fn detail_template(page: PageContext, menu: &CafeMenu) -> CafeDetailTemplate {
    CafeDetailTemplate {
        page,
        cafe: CafeCard::from(&menu.cafe),
        sections: menu
            .sections
            .iter()
            .map(|s| SectionView {
                id: s.category.id,
                name: s.category.name.clone(),
                count: menu.item_count(s.category.id),
                items: s.items.iter().map(ItemView::from).collect(),
            })
            .collect(),
        popular: menu.popular_item.as_ref().map(ItemView::from),
        addon_groups: menu.addon_groups.iter().map(|g| g.name.clone()).collect(),
        addons_count: menu.addons.len(),
        cafes_count: menu.cafes_count,
        menu_json: script_json(&menu.menu_json),
    }
}

pub fn not_found(page: PageContext, message: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        NotFoundTemplate {
            page,
            message: message.to_string(),
        },
    )
        .into_response()
}

/// GET /
pub async fn home(State(state): State<AppState>, session: SessionHandle) -> Response {
    let cafes_count = state.cafes.count_active().await.unwrap_or_else(|e| {
        error!("Failed to count cafes: {:#}", e);
        0
    });
    HomeTemplate {
        page: PageContext::load(&state, &session).await,
        cafes_count,
    }
    .into_response()
}

/// GET /cafes/
pub async fn cafe_list(State(state): State<AppState>, session: SessionHandle) -> Response {
    let cafes = match state.cafes.list_active().await {
        Ok(cafes) => cafes,
        Err(e) => {
            error!("Failed to list cafes: {:#}", e);
            Vec::new()
        }
    };
    if let [only] = cafes.as_slice() {
        return Redirect::to(&format!("/cafe/{}/", only.id)).into_response();
    }
    CafeListTemplate {
        page: PageContext::load(&state, &session).await,
        cafes: cafes.iter().map(CafeCard::from).collect(),
    }
    .into_response()
}

/// GET /cafe/{id}/
pub async fn cafe_detail(State(state): State<AppState>, session: SessionHandle, Path(cafe_id): Path<i64>) -> Response {
    let page = PageContext::load(&state, &session).await;
    match state.menu_service.cafe_menu(cafe_id).await {
        Ok(Some(menu)) => detail_template(page, &menu).into_response(),
        Ok(None) => not_found(page, "Кафе не найдено"),
        Err(e) => {
            error!("Failed to load cafe {}: {:#}", cafe_id, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
        }
    }
}
