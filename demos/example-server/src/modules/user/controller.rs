use crate::modules::user::domain::CreateUserRequest;
use crate::modules::user::{User, UserService};
use axum::extract::{FromRequest, FromRequestParts, Path};
use switchyard::prelude::*;
use switchyard::validation::RequiredFields;

#[derive(DeriveInjectable)]
pub struct UserController {
    users: Arc<UserService>,
}

pub fn declare_controller(store: &MetadataStore) -> Result<()> {
    ControllerDefinition::<UserController>::new("users")
        .route(RouteDefinition::get("").auth_required(false), UserController::list)
        .route(
            RouteDefinition::get("/:id")
                .auth_required(false)
                .params_shape(RequiredFields::new(["id"])),
            UserController::find,
        )
        .route(
            RouteDefinition::post("").body_shape(RequiredFields::new(["name", "email"])),
            UserController::create,
        )
        .register(store)
}

impl UserController {
    async fn list(self: Arc<Self>, _request: Request<Body>) -> HandlerResult<Json<Vec<User>>> {
        Ok(Json(self.users.find_all().await))
    }

    async fn find(self: Arc<Self>, request: Request<Body>) -> HandlerResult<Json<User>> {
        let (mut parts, _body) = request.into_parts();
        let Path(id) = Path::<String>::from_request_parts(&mut parts, &())
            .await
            .map_err(|rejection| HandlerError::bad_request(rejection.body_text()))?;
        Ok(Json(self.users.find_one(&id).await?))
    }

    async fn create(self: Arc<Self>, request: Request<Body>) -> HandlerResult<(StatusCode, Json<User>)> {
        let Json(body) = Json::<CreateUserRequest>::from_request(request, &())
            .await
            .map_err(|rejection| HandlerError::bad_request(rejection.body_text()))?;
        Ok((StatusCode::CREATED, Json(self.users.create(body).await)))
    }
}
