//! REST implementation of [`SessionClient`].
//!
//! Endpoints, relative to the API root (e.g. `http://host:5000/slurk/api`):
//!
//! | operation | request |
//! |---|---|
//! | remove participant | `GET users/{u}` for the `ETag`, then `DELETE users/{u}/rooms/{r}` with `If-Match` |
//! | add participant | `POST users/{u}/rooms/{r}` |
//! | create session | `POST layouts`, then `POST rooms {layout_id}` |
//! | broadcast | `POST rooms/{r}/messages` |
//! | composing | `POST rooms/{r}/typing` |
//! | session ready | `POST rooms/{r}/ready` |
//! | participant task | `GET users/{u}/task` |

use async_trait::async_trait;
use convene_core::{BroadcastOptions, ParticipantId, SessionId, TaskId};
use convene_settings::PlatformSettings;
use reqwest::header::{ACCEPT, ETAG, IF_MATCH};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::client::SessionClient;
use crate::error::{ClientError, ClientResult};

/// Longest response body kept in a [`ClientError::Status`].
const MAX_ERROR_BODY: usize = 512;

#[derive(Deserialize)]
struct Created<T> {
    id: T,
}

#[derive(Deserialize)]
struct TaskRecord {
    id: TaskId,
}

/// Session client speaking the platform's REST API.
#[derive(Clone)]
pub struct HttpSessionClient {
    http: reqwest::Client,
    api_root: String,
    token: String,
}

impl HttpSessionClient {
    /// Build a client with its own connection pool.
    pub fn new(platform: &PlatformSettings, token: impl Into<String>) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(platform.request_timeout())
            .build()?;
        Ok(Self::with_client(http, platform.api_root(), token))
    }

    /// Build a client on top of an existing `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, api_root: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http,
            api_root: api_root.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/{path}", self.api_root))
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/json")
    }

    async fn send(&self, path: &str, builder: RequestBuilder) -> ClientResult<Response> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            debug!(path, status = status.as_u16(), "platform request ok");
            return Ok(response);
        }
        let mut body = response.text().await.unwrap_or_default();
        truncate_at_char_boundary(&mut body, MAX_ERROR_BODY);
        Err(ClientError::Status {
            endpoint: path.to_string(),
            status: status.as_u16(),
            body,
        })
    }

    async fn post_json(&self, path: &str, body: &Value) -> ClientResult<Response> {
        self.send(path, self.request(Method::POST, path).json(body)).await
    }

    async fn create_room(&self, layout: Value) -> ClientResult<SessionId> {
        let layout_id = decode::<Created<Value>>("layouts", self.post_json("layouts", &layout).await?)
            .await?
            .id;
        let room = decode::<Created<SessionId>>(
            "rooms",
            self.post_json("rooms", &json!({ "layout_id": layout_id })).await?,
        )
        .await?;
        Ok(room.id)
    }
}

/// Cut `text` to at most `max` bytes without splitting a character.
fn truncate_at_char_boundary(text: &mut String, max: usize) {
    if text.len() <= max {
        return;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
}

async fn decode<T: DeserializeOwned>(endpoint: &str, response: Response) -> ClientResult<T> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode {
        endpoint: endpoint.to_string(),
        message: e.to_string(),
    })
}

fn chat_layout() -> Value {
    json!({
        "title": "Chat",
        "show_users": true,
        "show_latency": false,
        "read_only": false,
    })
}

fn redirect_layout(target_url: &str) -> Value {
    json!({
        "title": "Forwarding",
        "subtitle": target_url,
        "read_only": true,
        "show_users": false,
        "html": [{
            "layout-type": "a",
            "id": "forward",
            "href": target_url,
            "layout-content": "Continue",
        }],
        "scripts": { "plain": format!("window.location.replace({});", json!(target_url)) },
    })
}

#[async_trait]
impl SessionClient for HttpSessionClient {
    #[instrument(skip(self), fields(session_id = %session, participant_id = %participant))]
    async fn remove_participant(&self, session: &SessionId, participant: &ParticipantId) -> ClientResult<()> {
        let user_path = format!("users/{participant}");
        let response = self.send(&user_path, self.request(Method::GET, &user_path)).await?;
        let etag = response
            .headers()
            .get(ETAG)
            .cloned()
            .ok_or(ClientError::MissingHeader {
                endpoint: user_path,
                header: "ETag",
            })?;

        let path = format!("users/{participant}/rooms/{session}");
        let _ = self
            .send(&path, self.request(Method::DELETE, &path).header(IF_MATCH, etag))
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(session_id = %session, participant_id = %participant))]
    async fn add_participant(&self, session: &SessionId, participant: &ParticipantId) -> ClientResult<()> {
        let path = format!("users/{participant}/rooms/{session}");
        let _ = self.send(&path, self.request(Method::POST, &path)).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn create_redirect_session(&self, target_url: &str) -> ClientResult<SessionId> {
        self.create_room(redirect_layout(target_url)).await
    }

    async fn create_session(&self) -> ClientResult<SessionId> {
        self.create_room(chat_layout()).await
    }

    async fn broadcast(&self, session: &SessionId, text: &str, options: BroadcastOptions) -> ClientResult<()> {
        let path = format!("rooms/{session}/messages");
        let mut body = json!({
            "message": text,
            "html": true,
            "broadcast": options.persistent,
        });
        if let Some(receiver) = options.to_participant {
            body["receiver_id"] = json!(receiver);
        }
        let _ = self.post_json(&path, &body).await?;
        Ok(())
    }

    async fn set_composing(&self, session: &SessionId, composing: bool) -> ClientResult<()> {
        let path = format!("rooms/{session}/typing");
        let _ = self.post_json(&path, &json!({ "typing": composing })).await?;
        Ok(())
    }

    async fn announce_session_ready(&self, session: &SessionId) -> ClientResult<()> {
        let path = format!("rooms/{session}/ready");
        let _ = self.send(&path, self.request(Method::POST, &path)).await?;
        Ok(())
    }

    async fn participant_task(&self, participant: &ParticipantId) -> ClientResult<Option<TaskId>> {
        let path = format!("users/{participant}/task");
        let response = match self.send(&path, self.request(Method::GET, &path)).await {
            Ok(response) => response,
            Err(ClientError::Status { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let task: Option<TaskRecord> = decode(&path, response).await?;
        Ok(task.map(|t| t.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> HttpSessionClient {
        HttpSessionClient::with_client(reqwest::Client::new(), format!("{}/slurk/api/", server.uri()), "tok")
    }

    #[tokio::test]
    async fn remove_participant_uses_etag() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slurk/api/users/5"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"v3\"").set_body_json(json!({"id": 5})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/slurk/api/users/5/rooms/9"))
            .and(header("if-match", "\"v3\""))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .remove_participant(&SessionId::from("9"), &ParticipantId::from("5"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn remove_participant_without_etag_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slurk/api/users/5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 5})))
            .mount(&server)
            .await;

        let err = client(&server)
            .remove_participant(&SessionId::from("9"), &ParticipantId::from("5"))
            .await
            .unwrap_err();
        assert_matches!(err, ClientError::MissingHeader { header: "ETag", .. });
    }

    #[tokio::test]
    async fn add_participant_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/slurk/api/users/5/rooms/9"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .mount(&server)
            .await;

        let err = client(&server)
            .add_participant(&SessionId::from("9"), &ParticipantId::from("5"))
            .await
            .unwrap_err();
        assert_matches!(&err, ClientError::Status { status: 503, body, .. } if body == "busy");
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn long_error_body_is_cut_on_char_boundary() {
        let server = MockServer::start().await;
        let body = format!("{}ä trailing", "x".repeat(MAX_ERROR_BODY - 1));
        Mock::given(method("POST"))
            .and(path("/slurk/api/users/5/rooms/9"))
            .respond_with(ResponseTemplate::new(500).set_body_string(body))
            .mount(&server)
            .await;

        let err = client(&server)
            .add_participant(&SessionId::from("9"), &ParticipantId::from("5"))
            .await
            .unwrap_err();
        assert_matches!(err, ClientError::Status { status: 500, body, .. } => {
            assert_eq!(body.len(), MAX_ERROR_BODY - 1);
            assert!(body.chars().all(|c| c == 'x'));
        });
    }

    #[test]
    fn truncate_keeps_short_and_multibyte_text_intact() {
        let mut short = "äöü".to_owned();
        truncate_at_char_boundary(&mut short, 16);
        assert_eq!(short, "äöü");

        let mut wide = "ääää".to_owned();
        truncate_at_char_boundary(&mut wide, 5);
        assert_eq!(wide, "ää");
    }

    #[tokio::test]
    async fn create_redirect_session_creates_layout_then_room() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/slurk/api/layouts"))
            .and(body_partial_json(json!({"subtitle": "https://survey.example/x"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 31})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/slurk/api/rooms"))
            .and(body_partial_json(json!({"layout_id": 31})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 77})))
            .expect(1)
            .mount(&server)
            .await;

        let room = client(&server)
            .create_redirect_session("https://survey.example/x")
            .await
            .unwrap();
        assert_eq!(room, SessionId::from("77"));
    }

    #[tokio::test]
    async fn create_session_bad_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/slurk/api/layouts"))
            .respond_with(ResponseTemplate::new(201).set_body_string("ok"))
            .mount(&server)
            .await;

        let err = client(&server).create_session().await.unwrap_err();
        assert_matches!(err, ClientError::Decode { .. });
    }

    #[tokio::test]
    async fn broadcast_addresses_receiver() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/slurk/api/rooms/3/messages"))
            .and(body_partial_json(json!({"message": "hi", "receiver_id": "8", "broadcast": true})))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .broadcast(&SessionId::from("3"), "hi", BroadcastOptions::to("8").persistent())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn set_composing_posts_flag() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/slurk/api/rooms/3/typing"))
            .and(body_partial_json(json!({"typing": false})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .set_composing(&SessionId::from("3"), false)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn participant_task_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slurk/api/users/4/task"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 2, "name": "pairs", "num_users": 2})))
            .mount(&server)
            .await;

        let task = client(&server)
            .participant_task(&ParticipantId::from("4"))
            .await
            .unwrap();
        assert_eq!(task, Some(TaskId::from("2")));
    }

    #[tokio::test]
    async fn participant_task_missing_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slurk/api/users/4/task"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/slurk/api/users/6/task"))
            .respond_with(ResponseTemplate::new(200).set_body_json(Value::Null))
            .mount(&server)
            .await;

        let c = client(&server);
        assert_eq!(c.participant_task(&ParticipantId::from("4")).await.unwrap(), None);
        assert_eq!(c.participant_task(&ParticipantId::from("6")).await.unwrap(), None);
    }

    #[test]
    fn redirect_layout_escapes_url() {
        let layout = redirect_layout("https://x.example/?a=\"b\"");
        let script = layout["scripts"]["plain"].as_str().unwrap();
        assert!(script.contains(r#"\"b\""#));
    }
}
