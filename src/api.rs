use anyhow::Result;
use axum::{
    async_trait,
    extract::{DefaultBodyLimit, FromRequestParts, Path, State},
    http::{header, request::Parts, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};
use time::Duration;
use uuid::Uuid;

use crate::auth::{self, LoginRateLimiter};
use crate::categories::{self, CategoryUpdate};
use crate::characters::{self, AnnotationList, SelfUpdate};
use crate::config::Config;
use crate::error::ApiError;
use crate::gallery;
use crate::model::{
    Category, CharacterSeed, CharacterView, GalleryImage, Position, User, UserView,
};
use crate::store::JsonStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub users: Arc<JsonStore<User>>,
    pub categories: Arc<JsonStore<Category>>,
    pub gallery: Arc<JsonStore<GalleryImage>>,
    pub token_secret: Arc<Vec<u8>>,
    pub login_limiter: LoginRateLimiter,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self> {
        tokio::fs::create_dir_all(&config.data_dir).await?;
        let users = Arc::new(JsonStore::open(config.data_dir.join("users.json")).await?);
        let categories = Arc::new(JsonStore::open(config.data_dir.join("categories.json")).await?);
        let gallery = Arc::new(JsonStore::open(config.data_dir.join("gallery.json")).await?);
        let token_secret =
            Arc::new(auth::load_or_create_secret(&config.data_dir.join("token_secret")).await?);
        Ok(Self {
            config,
            users,
            categories,
            gallery,
            token_secret,
            login_limiter: LoginRateLimiter::new(5, std::time::Duration::from_secs(60)),
        })
    }
}

/// Authenticated caller, resolved from the bearer token.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthorized)?;
        let claims = auth::verify_token(&state.token_secret, token)
            .map_err(|_| ApiError::Unauthorized)?;
        let user = state
            .users
            .find(claims.sub)
            .await?
            .ok_or(ApiError::Unauthorized)?;
        Ok(CurrentUser(user))
    }
}

/// Authenticated caller that must hold the admin role.
pub struct AdminUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_admin {
            return Err(ApiError::Forbidden);
        }
        Ok(AdminUser(user))
    }
}

/// Build the HTTP application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/me", get(me))
        .route("/api/auth/verify", get(verify))
        .route("/api/characters", get(list_characters))
        .route("/api/characters/me", put(update_own_character))
        .route("/api/characters/:id", get(get_character))
        .route("/api/admin/move/:user_id", put(move_character))
        .route("/api/admin/trait/:user_id", post(add_trait))
        .route("/api/admin/item/:user_id", post(add_item))
        .route("/api/admin/history/:user_id", post(add_history))
        .route("/api/admin/interact/:user_id", post(add_interaction))
        .route("/api/admin/create-player", post(create_player))
        .route("/api/admin/hearts/:user_id", put(set_hearts))
        .route("/api/admin/assign-category/:user_id", put(assign_category))
        .route("/api/admin/costume/:user_id", put(set_costume))
        .route("/api/categories", get(list_categories).post(create_category))
        .route(
            "/api/categories/:id",
            get(get_category).put(update_category).delete(delete_category),
        )
        .route("/api/gallery", get(list_gallery).post(add_gallery_image))
        .route("/api/gallery/order", put(reorder_gallery))
        .route(
            "/api/gallery/:id",
            get(get_gallery_image).delete(delete_gallery_image),
        )
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes() as usize))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Deserialize)]
struct RegisterReq {
    username: String,
    password: String,
    #[serde(default)]
    character: Option<CharacterSeed>,
}

#[derive(Serialize)]
struct AuthResp {
    user: UserView,
    token: String,
}

async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterReq>,
) -> Result<(StatusCode, Json<AuthResp>), ApiError> {
    if req.username.len() < 3 {
        return Err(ApiError::Validation("username_too_short"));
    }
    if req.password.len() < 6 {
        return Err(ApiError::Validation("password_too_short"));
    }
    let hash = auth::hash_password(&req.password)?;
    let user = characters::create_account(
        &state.users,
        &req.username,
        Some(hash),
        false,
        req.character.unwrap_or_default(),
    )
    .await?;
    let token = auth::issue_token(&state.token_secret, user.id, Duration::days(7))?;
    Ok((
        StatusCode::CREATED,
        Json(AuthResp {
            user: user.view(),
            token,
        }),
    ))
}

#[derive(Deserialize)]
struct LoginReq {
    username: String,
    password: String,
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginReq>,
) -> Result<Json<AuthResp>, ApiError> {
    if !state.login_limiter.check(&req.username).await {
        return Err(ApiError::RateLimited);
    }
    let user = characters::find_by_username(&state.users, &req.username)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    // NPCs carry no hash and can never log in.
    let hash = user.password_hash.as_deref().ok_or(ApiError::Unauthorized)?;
    if !auth::verify_password(&req.password, hash) {
        return Err(ApiError::Unauthorized);
    }
    let token = auth::issue_token(&state.token_secret, user.id, Duration::days(7))?;
    Ok(Json(AuthResp {
        user: user.view(),
        token,
    }))
}

async fn me(CurrentUser(user): CurrentUser) -> Json<UserView> {
    Json(user.view())
}

#[derive(Serialize)]
struct VerifyResp {
    valid: bool,
    user: UserView,
}

async fn verify(CurrentUser(user): CurrentUser) -> Json<VerifyResp> {
    Json(VerifyResp {
        valid: true,
        user: user.view(),
    })
}

async fn list_characters(
    State(state): State<AppState>,
) -> Result<Json<Vec<CharacterView>>, ApiError> {
    Ok(Json(characters::list_all(&state.users).await?))
}

async fn get_character(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CharacterView>, ApiError> {
    Ok(Json(characters::get(&state.users, id).await?))
}

async fn update_own_character(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(update): Json<SelfUpdate>,
) -> Result<Json<UserView>, ApiError> {
    Ok(Json(
        characters::update_self(&state.users, user.id, update).await?,
    ))
}

#[derive(Deserialize)]
struct MoveReq {
    x: f64,
    y: f64,
}

async fn move_character(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(user_id): Path<Uuid>,
    Json(req): Json<MoveReq>,
) -> Result<Json<UserView>, ApiError> {
    Ok(Json(
        characters::move_to(&state.users, user_id, req.x, req.y).await?,
    ))
}

#[derive(Deserialize)]
struct TraitReq {
    #[serde(rename = "trait")]
    text: String,
}

async fn add_trait(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<Uuid>,
    Json(req): Json<TraitReq>,
) -> Result<Json<UserView>, ApiError> {
    Ok(Json(
        characters::append_annotation(
            &state.users,
            user_id,
            AnnotationList::Trait,
            &req.text,
            &admin.username,
        )
        .await?,
    ))
}

#[derive(Deserialize)]
struct ItemReq {
    item: String,
}

async fn add_item(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<Uuid>,
    Json(req): Json<ItemReq>,
) -> Result<Json<UserView>, ApiError> {
    Ok(Json(
        characters::append_annotation(
            &state.users,
            user_id,
            AnnotationList::Item,
            &req.item,
            &admin.username,
        )
        .await?,
    ))
}

#[derive(Deserialize)]
struct HistoryReq {
    entry: String,
}

async fn add_history(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<Uuid>,
    Json(req): Json<HistoryReq>,
) -> Result<Json<UserView>, ApiError> {
    Ok(Json(
        characters::append_annotation(
            &state.users,
            user_id,
            AnnotationList::History,
            &req.entry,
            &admin.username,
        )
        .await?,
    ))
}

#[derive(Deserialize)]
struct InteractReq {
    message: String,
}

async fn add_interaction(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<Uuid>,
    Json(req): Json<InteractReq>,
) -> Result<Json<UserView>, ApiError> {
    Ok(Json(
        characters::append_interaction(&state.users, user_id, &req.message, &admin.username)
            .await?,
    ))
}

#[derive(Deserialize)]
struct CreatePlayerReq {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    style: Option<String>,
}

async fn create_player(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Json(req): Json<CreatePlayerReq>,
) -> Result<(StatusCode, Json<UserView>), ApiError> {
    let seed = CharacterSeed {
        color: req.color,
        style: req.style,
        description: req.description,
        ..Default::default()
    };
    let npc = characters::create_npc(&state.users, &req.name, seed).await?;
    Ok((StatusCode::CREATED, Json(npc)))
}

#[derive(Deserialize)]
struct HeartsReq {
    hearts: u32,
}

async fn set_hearts(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(user_id): Path<Uuid>,
    Json(req): Json<HeartsReq>,
) -> Result<Json<UserView>, ApiError> {
    Ok(Json(
        characters::set_hearts(&state.users, user_id, req.hearts).await?,
    ))
}

#[derive(Deserialize)]
struct AssignCategoryReq {
    category_id: Option<Uuid>,
}

async fn assign_category(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(user_id): Path<Uuid>,
    Json(req): Json<AssignCategoryReq>,
) -> Result<Json<UserView>, ApiError> {
    Ok(Json(
        characters::assign_category(&state.users, user_id, req.category_id).await?,
    ))
}

#[derive(Deserialize)]
struct CostumeReq {
    costume_image: Option<String>,
}

async fn set_costume(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(user_id): Path<Uuid>,
    Json(req): Json<CostumeReq>,
) -> Result<Json<UserView>, ApiError> {
    Ok(Json(
        characters::set_costume(&state.users, user_id, req.costume_image).await?,
    ))
}

async fn list_categories(State(state): State<AppState>) -> Result<Json<Vec<Category>>, ApiError> {
    Ok(Json(categories::list(&state.categories).await?))
}

async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Category>, ApiError> {
    Ok(Json(categories::get(&state.categories, id).await?))
}

#[derive(Deserialize)]
struct CreateCategoryReq {
    name: String,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    icon: Option<String>,
    #[serde(default)]
    position: Option<Position>,
}

async fn create_category(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Json(req): Json<CreateCategoryReq>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    let category =
        categories::create(&state.categories, &req.name, req.color, req.icon, req.position)
            .await?;
    Ok((StatusCode::CREATED, Json(category)))
}

async fn update_category(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(update): Json<CategoryUpdate>,
) -> Result<Json<Category>, ApiError> {
    Ok(Json(
        categories::update(&state.categories, id, update).await?,
    ))
}

#[derive(Serialize)]
struct DeleteResp {
    success: bool,
}

async fn delete_category(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<DeleteResp>, ApiError> {
    categories::delete(&state.categories, id).await?;
    Ok(Json(DeleteResp { success: true }))
}

async fn list_gallery(State(state): State<AppState>) -> Result<Json<Vec<GalleryImage>>, ApiError> {
    Ok(Json(gallery::list(&state.gallery).await?))
}

async fn get_gallery_image(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<GalleryImage>, ApiError> {
    Ok(Json(gallery::get(&state.gallery, id).await?))
}

#[derive(Deserialize)]
struct GalleryAddReq {
    data: String,
    #[serde(default)]
    title: Option<String>,
}

async fn add_gallery_image(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Json(req): Json<GalleryAddReq>,
) -> Result<(StatusCode, Json<GalleryImage>), ApiError> {
    let image = gallery::add(&state.gallery, req.data, req.title).await?;
    Ok((StatusCode::CREATED, Json(image)))
}

#[derive(Deserialize)]
struct ReorderReq {
    image_ids: Vec<Uuid>,
}

async fn reorder_gallery(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Json(req): Json<ReorderReq>,
) -> Result<Json<Vec<GalleryImage>>, ApiError> {
    Ok(Json(gallery::reorder(&state.gallery, &req.image_ids).await?))
}

async fn delete_gallery_image(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<DeleteResp>, ApiError> {
    gallery::delete(&state.gallery, id).await?;
    Ok(Json(DeleteResp { success: true }))
}

/// Run the HTTP server bound to the configured address.
pub async fn run_http_server(config: Config) -> Result<()> {
    let addr: SocketAddr = config.bind.parse()?;
    let state = AppState::new(config).await?;
    tracing::info!("town hub listening on http://{}", addr);
    axum::Server::bind(&addr)
        .serve(build_router(state).into_make_service())
        .await?;
    Ok(())
}

// Integration tests live in tests/ directory
