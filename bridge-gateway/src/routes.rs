//! Route composition and rejection handling.

use std::convert::Infallible;
use std::sync::Arc;

use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use crate::handlers::{self, error_reply, AppContext};

fn with_context(
    context: Arc<AppContext>,
) -> impl Filter<Extract = (Arc<AppContext>,), Error = Infallible> + Clone {
    warp::any().map(move || Arc::clone(&context))
}

/// All gateway routes under `/mqtt`.
pub fn routes(
    context: Arc<AppContext>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let upsert = warp::put()
        .and(warp::path("mqtt"))
        .and(warp::path::end())
        .and(warp::body::json())
        .and(with_context(Arc::clone(&context)))
        .and_then(handlers::upsert_broker);

    let list = warp::get()
        .and(warp::path("mqtt"))
        .and(warp::path::end())
        .and(with_context(Arc::clone(&context)))
        .and_then(handlers::list_brokers);

    let get = warp::get()
        .and(warp::path("mqtt"))
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(with_context(Arc::clone(&context)))
        .and_then(handlers::get_broker);

    let delete = warp::delete()
        .and(warp::path("mqtt"))
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(with_context(Arc::clone(&context)))
        .and_then(handlers::delete_broker);

    let publish = warp::post()
        .and(warp::path("mqtt"))
        .and(warp::path::param::<String>())
        .and(warp::path("send"))
        .and(warp::path::tail())
        .and(warp::header::optional::<String>(
            handlers::REQUEST_ID_HEADER,
        ))
        .and(warp::body::json())
        .and(with_context(Arc::clone(&context)))
        .and_then(handlers::publish_message);

    let stream = warp::get()
        .and(warp::path("mqtt"))
        .and(warp::path::param::<String>())
        .and(warp::path("receive"))
        .and(warp::path::tail())
        .and(with_context(context))
        .and_then(handlers::stream_messages);

    upsert.or(list).or(get).or(delete).or(publish).or(stream)
}

/// Map rejections to the shared error body.
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let response = if err.is_not_found() {
        error_reply(StatusCode::NOT_FOUND, "Not Found", "resource not found")
    } else if let Some(body_err) = err.find::<warp::filters::body::BodyDeserializeError>() {
        error_reply(
            StatusCode::BAD_REQUEST,
            "Malformed JSON",
            &body_err.to_string(),
        )
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        error_reply(
            StatusCode::METHOD_NOT_ALLOWED,
            "Method Not Allowed",
            "method not allowed on this resource",
        )
    } else {
        tracing::error!(rejection = ?err, "unhandled rejection");
        error_reply(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal Server Error",
            "an unexpected error occurred",
        )
    };
    Ok(response)
}
