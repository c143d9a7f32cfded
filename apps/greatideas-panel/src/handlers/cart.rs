use askama::Template;
use askama_web::WebTemplate;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use greatideas_shared::cart::{is_valid_quantity, lenient_i64, lenient_ids};
use greatideas_shared::money::{format_rub, to_rubles};
use serde_json::{json, Value};
use tracing::{debug, error};

use super::{current_user, script_json, PageContext};
use crate::services::cart_service::CartLineView;
use crate::services::session_service::SessionHandle;
use crate::AppState;

#[derive(Template, WebTemplate)]
#[template(path = "cart.html")]
pub struct CartTemplate {
    pub page: PageContext,
    pub lines: Vec<CartLineView>,
    pub total_price: String,
    pub cart_count: usize,
    pub total_items: i64,
    pub cart_json: String,
    pub telegram_id: Option<i64>,
    pub customer_name: String,
}

/// A parsed add-to-cart request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddRequest {
    pub item_id: i64,
    pub variant_id: Option<i64>,
    pub quantity: i64,
    pub addon_ids: Vec<i64>,
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"))
}

/// Reads `{item_id, variant_id?, quantity=1, addon_ids[]}` from JSON, or the same
/// fields from a form where add-ons repeat as `addon_ids[]`.
pub fn parse_add_request(json_body: bool, body: &[u8]) -> Option<AddRequest> {
    let (item_id, variant_id, quantity, addon_ids) = if json_body {
        let data: Value = serde_json::from_slice(body).ok()?;
        (
            data.get("item_id").and_then(lenient_i64),
            data.get("variant_id").and_then(lenient_i64),
            data.get("quantity").and_then(lenient_i64),
            data.get("addon_ids").map(lenient_ids).unwrap_or_default(),
        )
    } else {
        let mut item_id = None;
        let mut variant_id = None;
        let mut quantity = None;
        let mut addon_ids = Vec::new();
        for (key, value) in url::form_urlencoded::parse(body) {
            let parsed = value.trim().parse::<i64>().ok();
            match key.as_ref() {
                "item_id" => item_id = parsed,
                "variant_id" => variant_id = parsed,
                "quantity" => quantity = parsed,
                "addon_ids[]" => addon_ids.extend(parsed),
                _ => {}
            }
        }
        (item_id, variant_id, quantity, addon_ids)
    };

    let quantity = quantity.unwrap_or(1);
    if !is_valid_quantity(quantity) {
        return None;
    }
    Some(AddRequest {
        item_id: item_id?,
        variant_id,
        quantity,
        addon_ids,
    })
}

/// GET /cart/
pub async fn cart_page(State(state): State<AppState>, session: SessionHandle) -> Response {
    let cart = session.cart().await;
    let priced = match state.cart_service.price(&cart).await {
        Ok(priced) => priced,
        Err(e) => {
            error!("Failed to price cart: {:#}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response();
        }
    };
    let user = current_user(&state, &session).await;
    let cart_json = serde_json::to_value(&cart).unwrap_or(Value::Null);

    CartTemplate {
        page: PageContext {
            cart_count: cart.total_items(),
            user_name: user.as_ref().map(|u| u.full_name()),
        },
        lines: priced.lines.iter().map(CartLineView::from).collect(),
        total_price: format_rub(priced.total_price()),
        cart_count: priced.cart_count(),
        total_items: priced.total_items(),
        cart_json: script_json(&cart_json),
        telegram_id: user.as_ref().map(|u| u.telegram_id),
        customer_name: user.map(|u| u.full_name()).unwrap_or_default(),
    }
    .into_response()
}

/// POST /add-to-cart/
pub async fn add_to_cart(session: SessionHandle, headers: HeaderMap, body: Bytes) -> Json<Value> {
    let Some(req) = parse_add_request(is_json(&headers), &body) else {
        debug!("Rejected add-to-cart body");
        return Json(json!({ "success": false }));
    };

    let total_items = session
        .update_cart(|cart| {
            cart.add(req.item_id, req.variant_id, req.addon_ids, req.quantity);
            cart.total_items()
        })
        .await;

    Json(json!({
        "success": true,
        "total_items": total_items,
        "cart_count": total_items,
        "message": "Товар добавлен в корзину",
    }))
}

#[derive(Debug, serde::Deserialize)]
pub struct CartKeyRequest {
    pub cart_key: Option<String>,
    #[serde(default)]
    pub quantity: Option<Value>,
}

fn parse_key_request(body: &[u8]) -> Option<CartKeyRequest> {
    serde_json::from_slice(body).ok()
}

/// POST /update-cart-item/
pub async fn update_cart_item(State(state): State<AppState>, session: SessionHandle, body: Bytes) -> Json<Value> {
    let Some(CartKeyRequest {
        cart_key: Some(key),
        quantity,
    }) = parse_key_request(&body)
    else {
        return Json(json!({ "success": false }));
    };
    let quantity = quantity.as_ref().and_then(lenient_i64).unwrap_or(1);

    if !session.update_cart(|cart| cart.set_quantity(&key, quantity)).await {
        return Json(json!({ "success": false }));
    }

    match state.cart_service.price(&session.cart().await).await {
        Ok(priced) => Json(json!({
            "success": true,
            "total_price": to_rubles(priced.total_price()),
            "total_items": priced.total_items(),
        })),
        Err(e) => {
            error!("Failed to price cart: {:#}", e);
            Json(json!({ "success": false }))
        }
    }
}

/// POST /remove-from-cart/
pub async fn remove_from_cart(State(state): State<AppState>, session: SessionHandle, body: Bytes) -> Json<Value> {
    let Some(CartKeyRequest { cart_key: Some(key), .. }) = parse_key_request(&body) else {
        return Json(json!({ "success": false }));
    };

    if !session.update_cart(|cart| cart.remove(&key)).await {
        return Json(json!({ "success": false }));
    }

    let cart = session.cart().await;
    match state.cart_service.price(&cart).await {
        Ok(priced) => Json(json!({
            "success": true,
            "cart_empty": cart.is_empty(),
            "total_price": to_rubles(priced.total_price()),
            "total_items": priced.total_items(),
        })),
        Err(e) => {
            error!("Failed to price cart: {:#}", e);
            Json(json!({ "success": false }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support;

    #[test]
    fn parses_json_and_form_bodies() {
        let json_req = parse_add_request(true, br#"{"item_id":"5","addon_ids":[3,"1"]}"#).unwrap();
        assert_eq!(
            json_req,
            AddRequest {
                item_id: 5,
                variant_id: None,
                quantity: 1,
                addon_ids: vec![3, 1],
            }
        );

        let form = parse_add_request(false, b"item_id=5&variant_id=2&quantity=3&addon_ids%5B%5D=7&addon_ids%5B%5D=4")
            .unwrap();
        assert_eq!(form.variant_id, Some(2));
        assert_eq!(form.quantity, 3);
        assert_eq!(form.addon_ids, vec![7, 4]);

        assert!(parse_add_request(true, br#"{"quantity":2}"#).is_none());
        assert!(parse_add_request(true, br#"{"item_id":1,"quantity":0}"#).is_none());
        assert!(parse_add_request(true, br#"{"item_id":1,"quantity":100}"#).is_none());
        assert!(parse_add_request(false, b"item_id=1&quantity=9223372036854775807").is_none());
        assert!(parse_add_request(true, b"not json").is_none());
    }

    #[tokio::test]
    async fn add_merges_and_update_remove_recompute() {
        let (state, pool) = test_support::state().await;
        let demo = greatideas_db::seed::demo_menu(&pool).await.unwrap();
        let session = SessionHandle::default();
        let mut json_headers = HeaderMap::new();
        json_headers.insert(header::CONTENT_TYPE, "application/json".parse().unwrap());

        let body = format!(r#"{{"item_id":{},"addon_ids":[{},{}]}}"#, demo.latte_id, demo.syrup_id, demo.oat_milk_id);
        add_to_cart(session.clone(), json_headers.clone(), Bytes::from(body)).await;
        let reversed = format!(
            r#"{{"item_id":{},"addon_ids":[{},{}],"quantity":2}}"#,
            demo.latte_id, demo.oat_milk_id, demo.syrup_id
        );
        let Json(added) = add_to_cart(session.clone(), json_headers, Bytes::from(reversed)).await;
        assert_eq!(added["total_items"], 3);
        assert_eq!(session.cart().await.len(), 1);

        let key = session.cart().await.iter().next().unwrap().0.clone();
        let Json(updated) = update_cart_item(
            State(state.clone()),
            session.clone(),
            Bytes::from(format!(r#"{{"cart_key":"{}","quantity":1}}"#, key)),
        )
        .await;
        assert_eq!(updated["success"], true);
        assert_eq!(updated["total_items"], 1);
        // 250 + 40 + 30
        assert_eq!(updated["total_price"], 320.0);

        let Json(zero) = update_cart_item(
            State(state.clone()),
            session.clone(),
            Bytes::from(format!(r#"{{"cart_key":"{}","quantity":0}}"#, key)),
        )
        .await;
        assert_eq!(zero["success"], false);

        let Json(removed) = remove_from_cart(
            State(state.clone()),
            session.clone(),
            Bytes::from(format!(r#"{{"cart_key":"{}"}}"#, key)),
        )
        .await;
        assert_eq!(removed["cart_empty"], true);

        let Json(again) =
            remove_from_cart(State(state), session, Bytes::from(format!(r#"{{"cart_key":"{}"}}"#, key))).await;
        assert_eq!(again["success"], false);
    }

    #[tokio::test]
    async fn oversized_quantities_are_rejected() {
        let (state, _pool) = test_support::state().await;
        let session = SessionHandle::default();
        let mut json_headers = HeaderMap::new();
        json_headers.insert(header::CONTENT_TYPE, "application/json".parse().unwrap());

        let huge = Bytes::from(r#"{"item_id":1,"quantity":9223372036854775807}"#);
        let Json(rejected) = add_to_cart(session.clone(), json_headers.clone(), huge).await;
        assert_eq!(rejected["success"], false);
        assert!(session.cart().await.is_empty());

        let Json(first) =
            add_to_cart(session.clone(), json_headers.clone(), Bytes::from(r#"{"item_id":1,"quantity":99}"#)).await;
        assert_eq!(first["total_items"], 99);
        let Json(merged) = add_to_cart(session.clone(), json_headers, Bytes::from(r#"{"item_id":1,"quantity":5}"#)).await;
        assert_eq!(merged["total_items"], 99);

        let Json(update) = update_cart_item(
            State(state),
            session.clone(),
            Bytes::from(r#"{"cart_key":"1","quantity":1000000}"#),
        )
        .await;
        assert_eq!(update["success"], false);
        assert_eq!(session.cart().await.total_items(), 99);
    }
}
