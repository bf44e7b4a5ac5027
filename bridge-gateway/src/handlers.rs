//! Request/response types and route handlers.
//!
//! Status mapping: validation and serialization problems are 400, a missing
//! broker configuration is 404, transport problems are 500. The streaming
//! endpoint is the exception: its HTTP response is always 200 and logical
//! failures arrive as terminal `error` events in the body.

use std::convert::Infallible;
use std::sync::Arc;

use bridge_client::{BrokerDescriptor, BrokerId};
use bridge_core::{MessagePublisher, StreamBridge};
use bridge_store::ConfigStore;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use uuid::Uuid;
use warp::http::StatusCode;
use warp::path::Tail;
use warp::{reply, Reply};

use crate::sse;

/// Shared handler state, composed once at startup.
pub struct AppContext {
    pub store: Arc<dyn ConfigStore>,
    pub publisher: Arc<MessagePublisher>,
    pub bridge: Arc<StreamBridge>,
}

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Body of `PUT /mqtt`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerConfigurationRequest {
    pub host_name: String,
    pub port: u16,
}

impl BrokerConfigurationRequest {
    /// Validate the request, returning the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.host_name.trim().is_empty() {
            return Err("hostName is required".to_string());
        }
        if self.port == 0 {
            return Err("port must be between 1 and 65535".to_string());
        }
        Ok(())
    }
}

/// Body of a successful upsert.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerConfigurationResponse {
    pub broker_id: BrokerId,
}

/// One broker configuration as returned by the read endpoints.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerResponse {
    pub broker_id: BrokerId,
    pub host_name: String,
    pub port: u16,
}

impl From<BrokerDescriptor> for BrokerResponse {
    fn from(descriptor: BrokerDescriptor) -> Self {
        Self {
            broker_id: descriptor.id,
            host_name: descriptor.host,
            port: descriptor.port,
        }
    }
}

/// Outcome marker on publish responses.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PublishStatus {
    Published,
    Failed,
}

/// Body of the publish endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResponse {
    pub broker_id: BrokerId,
    pub topic: String,
    pub status: PublishStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

/// Error body shared by every non-2xx response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: u16,
    pub error: String,
    pub message: String,
}

/// Build a JSON error reply with the matching status code.
pub fn error_reply(
    status: StatusCode,
    error: &str,
    message: &str,
) -> reply::WithStatus<reply::Json> {
    reply::with_status(
        reply::json(&ErrorResponse {
            status: status.as_u16(),
            error: error.to_string(),
            message: message.to_string(),
        }),
        status,
    )
}

/// `PUT /mqtt` — insert or update a broker configuration by host name.
pub async fn upsert_broker(
    request: BrokerConfigurationRequest,
    context: Arc<AppContext>,
) -> Result<impl Reply, warp::Rejection> {
    if let Err(message) = request.validate() {
        return Ok(error_reply(
            StatusCode::BAD_REQUEST,
            "Validation Failed",
            &message,
        ));
    }

    match context
        .store
        .upsert(request.host_name.trim(), request.port)
        .await
    {
        Ok(broker_id) => {
            debug!(broker_id = %broker_id, host = %request.host_name, "stored broker configuration");
            Ok(reply::with_status(
                reply::json(&BrokerConfigurationResponse { broker_id }),
                StatusCode::OK,
            ))
        }
        Err(err) => {
            error!(error = %err, "broker configuration upsert failed");
            Ok(error_reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
                &err.to_string(),
            ))
        }
    }
}

/// `GET /mqtt` — list all broker configurations.
pub async fn list_brokers(context: Arc<AppContext>) -> Result<impl Reply, warp::Rejection> {
    match context.store.list().await {
        Ok(descriptors) => {
            let body: Vec<BrokerResponse> =
                descriptors.into_iter().map(BrokerResponse::from).collect();
            Ok(reply::with_status(reply::json(&body), StatusCode::OK))
        }
        Err(err) => {
            error!(error = %err, "broker configuration listing failed");
            Ok(error_reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
                &err.to_string(),
            ))
        }
    }
}

/// `GET /mqtt/{brokerId}` — fetch one broker configuration.
pub async fn get_broker(
    broker_id: String,
    context: Arc<AppContext>,
) -> Result<impl Reply, warp::Rejection> {
    let broker_id = BrokerId::new(broker_id);
    match context.store.get(&broker_id).await {
        Ok(Some(descriptor)) => Ok(reply::with_status(
            reply::json(&BrokerResponse::from(descriptor)),
            StatusCode::OK,
        )),
        Ok(None) => Ok(error_reply(
            StatusCode::NOT_FOUND,
            "Invalid Broker Id",
            &format!("no broker configuration found for id {broker_id}"),
        )),
        Err(err) => {
            error!(broker_id = %broker_id, error = %err, "broker configuration lookup failed");
            Ok(error_reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
                &err.to_string(),
            ))
        }
    }
}

/// `DELETE /mqtt/{brokerId}` — delete one broker configuration.
pub async fn delete_broker(
    broker_id: String,
    context: Arc<AppContext>,
) -> Result<impl Reply, warp::Rejection> {
    let broker_id = BrokerId::new(broker_id);
    let response = match context.store.delete(&broker_id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => error_reply(
            StatusCode::NOT_FOUND,
            "Invalid Broker Id",
            &format!("no broker configuration found for id {broker_id}"),
        )
        .into_response(),
        Err(err) => {
            error!(broker_id = %broker_id, error = %err, "broker configuration delete failed");
            error_reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
                &err.to_string(),
            )
            .into_response()
        }
    };
    Ok(response)
}

/// `POST /mqtt/{brokerId}/send/{topic...}` — publish one JSON payload.
pub async fn publish_message(
    broker_id: String,
    topic: Tail,
    request_id: Option<String>,
    body: serde_json::Value,
    context: Arc<AppContext>,
) -> Result<impl Reply, warp::Rejection> {
    let request_id = request_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let broker_id = BrokerId::new(broker_id);
    let topic = topic.as_str().to_string();

    debug!(
        broker_id = %broker_id,
        topic = %topic,
        request_id = %request_id,
        "publish request"
    );

    if topic.trim().is_empty() {
        let reply = error_reply(
            StatusCode::BAD_REQUEST,
            "Mqtt Publish Input Error",
            "topic cannot be empty",
        );
        return Ok(reply::with_header(reply, REQUEST_ID_HEADER, request_id));
    }

    let reply = match context
        .publisher
        .publish(&broker_id, &topic, &body, None, None)
        .await
    {
        Ok(()) => reply::with_status(
            reply::json(&PublishResponse {
                broker_id,
                topic,
                status: PublishStatus::Published,
                failure_reason: None,
            }),
            StatusCode::OK,
        ),
        Err(err) => {
            error!(
                broker_id = %broker_id,
                topic = %topic,
                request_id = %request_id,
                error = %err,
                "publish failed"
            );
            let status = if err.is_not_found() {
                StatusCode::NOT_FOUND
            } else if err.is_input_error() {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            reply::with_status(
                reply::json(&PublishResponse {
                    broker_id,
                    topic,
                    status: PublishStatus::Failed,
                    failure_reason: Some(err.to_string()),
                }),
                status,
            )
        }
    };

    Ok(reply::with_header(reply, REQUEST_ID_HEADER, request_id))
}

/// `GET /mqtt/{brokerId}/receive/{topic...}` — stream messages as SSE.
///
/// The response itself always succeeds; acquisition and subscription
/// failures arrive as a terminal `error` event followed by end of stream.
pub async fn stream_messages(
    broker_id: String,
    topic: Tail,
    context: Arc<AppContext>,
) -> Result<impl Reply, warp::Rejection> {
    let broker_id = BrokerId::new(broker_id);
    let topic = topic.as_str().to_string();
    debug!(broker_id = %broker_id, topic = %topic, "stream request");

    let events = context
        .bridge
        .open(broker_id, topic)
        .map(|event| Ok::<_, Infallible>(sse::encode(event)));

    Ok(warp::sse::reply(events))
}
