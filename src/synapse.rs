//! Synapse destination over the REST API.
//!
//! Implements the engine's destination traits against
//! `{endpoint}/repo/v1` and `{endpoint}/file/v1`, authenticating with a
//! personal access token read from the configured environment variable.
//!
//! | Operation | Requests |
//! |-----------|----------|
//! | [`SynapseClient::ensure_project`] | `POST /entity`, on 409 `POST /entity/child` |
//! | `create_folder` | `POST /entity`, on 409 lookup + `GET /entity/{id}` |
//! | `create_file` | none (handle only) |
//! | `persist` | `POST /externalFileHandle`, `POST`/`PUT /activity`, `POST`/`PUT /entity` |
//! | `fetch_activity` | `GET /entity/{id}/generatedBy` |
//!
//! Files are registered as external file handles pointing at their source
//! download reference; no content is uploaded.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use synapse_sync_core::models::{Activity, ActivityLookup, DestHandle, DestKind, UsedEntity};
use synapse_sync_core::traits::{ActivityStore, Creator, Persister};
use tracing::debug;

use crate::config::DestinationConfig;

const PROJECT_TYPE: &str = "org.sagebionetworks.repo.model.Project";
const FOLDER_TYPE: &str = "org.sagebionetworks.repo.model.Folder";
const FILE_TYPE: &str = "org.sagebionetworks.repo.model.FileEntity";
const EXTERNAL_HANDLE_TYPE: &str = "org.sagebionetworks.repo.model.file.ExternalFileHandle";
const USED_ENTITY_TYPE: &str = "org.sagebionetworks.repo.model.provenance.UsedEntity";

enum Reply {
    Ok(Value),
    Conflict,
    NotFound,
}

pub struct SynapseClient {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl SynapseClient {
    pub fn new(config: &DestinationConfig) -> Result<Self> {
        let token = std::env::var(&config.token_env)
            .map_err(|_| anyhow!("{} not set", config.token_env))?;
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            token,
        })
    }

    async fn call(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Reply> {
        let url = format!("{}{}", self.endpoint, path);
        let mut req = self
            .client
            .request(method.clone(), &url)
            .bearer_auth(&self.token);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req
            .send()
            .await
            .with_context(|| format!("Synapse request failed: {} {}", method, path))?;

        let status = resp.status();
        if status == StatusCode::CONFLICT {
            return Ok(Reply::Conflict);
        }
        if status == StatusCode::NOT_FOUND {
            return Ok(Reply::NotFound);
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("Synapse {} {} failed (HTTP {}): {}", method, path, status, text);
        }

        let text = resp.text().await.unwrap_or_default();
        if text.trim().is_empty() {
            return Ok(Reply::Ok(Value::Null));
        }
        let value = serde_json::from_str(&text)
            .with_context(|| format!("Invalid Synapse response for {} {}", method, path))?;
        Ok(Reply::Ok(value))
    }

    async fn call_ok(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        match self.call(method.clone(), path, body).await? {
            Reply::Ok(value) => Ok(value),
            Reply::Conflict => bail!("Synapse {} {} conflicted (HTTP 409)", method, path),
            Reply::NotFound => bail!("Synapse {} {} not found (HTTP 404)", method, path),
        }
    }

    /// Create the project, or look it up if a project with this name exists.
    pub async fn ensure_project(&self, name: &str) -> Result<DestHandle> {
        let body = json!({ "name": name, "concreteType": PROJECT_TYPE });
        let id = match self.call(Method::POST, "/repo/v1/entity", Some(&body)).await? {
            Reply::Ok(entity) => entity_id(&entity)?,
            Reply::Conflict => self.lookup_child(None, name).await?,
            Reply::NotFound => bail!("Synapse rejected project creation for '{}'", name),
        };
        debug!(project = %name, id = %id, "destination project ready");
        let mut handle = DestHandle::project(name);
        handle.id = Some(id);
        Ok(handle)
    }

    async fn lookup_child(&self, parent_id: Option<&str>, name: &str) -> Result<String> {
        let body = json!({ "entityName": name, "parentId": parent_id });
        let reply = self
            .call_ok(Method::POST, "/repo/v1/entity/child", Some(&body))
            .await
            .with_context(|| format!("Failed to look up existing entity '{}'", name))?;
        entity_id(&reply)
    }

    async fn get_entity(&self, id: &str) -> Result<Value> {
        self.call_ok(Method::GET, &format!("/repo/v1/entity/{}", id), None)
            .await
    }

    async fn register_external_handle(&self, name: &str, url: &str) -> Result<String> {
        let body = json!({
            "concreteType": EXTERNAL_HANDLE_TYPE,
            "externalURL": url,
            "fileName": name,
        });
        let reply = self
            .call_ok(Method::POST, "/file/v1/externalFileHandle", Some(&body))
            .await?;
        entity_id(&reply)
    }

    async fn store_activity(&self, activity: &Activity) -> Result<String> {
        let mut body = activity_to_json(activity);
        match &activity.id {
            None => {
                let reply = self
                    .call_ok(Method::POST, "/repo/v1/activity", Some(&body))
                    .await?;
                entity_id(&reply)
            }
            Some(id) => {
                let path = format!("/repo/v1/activity/{}", id);
                let current = self.call_ok(Method::GET, &path, None).await?;
                body["id"] = json!(id);
                body["etag"] = current.get("etag").cloned().unwrap_or(Value::Null);
                self.call_ok(Method::PUT, &path, Some(&body)).await?;
                Ok(id.clone())
            }
        }
    }

    async fn persist_file(
        &self,
        handle: &DestHandle,
        external_url: Option<&str>,
        activity_id: Option<&str>,
        force_new_version: bool,
    ) -> Result<Value> {
        let parent_id = handle
            .parent_id
            .as_deref()
            .ok_or_else(|| anyhow!("File '{}' has no parent", handle.name))?;

        let data_handle = match (&handle.id, external_url) {
            (None, Some(url)) => Some(self.register_external_handle(&handle.name, url).await?),
            (None, None) => bail!("File '{}' has no download reference", handle.name),
            (Some(_), _) => None,
        };

        let generated_by = activity_id
            .map(|id| format!("generatedBy={}", id))
            .unwrap_or_default();

        let existing = match &handle.id {
            Some(id) => id.clone(),
            None => {
                let body = json!({
                    "name": handle.name,
                    "parentId": parent_id,
                    "concreteType": FILE_TYPE,
                    "dataFileHandleId": data_handle,
                });
                let path = if generated_by.is_empty() {
                    "/repo/v1/entity".to_string()
                } else {
                    format!("/repo/v1/entity?{}", generated_by)
                };
                match self.call(Method::POST, &path, Some(&body)).await? {
                    Reply::Ok(entity) => return Ok(entity),
                    Reply::Conflict => self.lookup_child(Some(parent_id), &handle.name).await?,
                    Reply::NotFound => bail!("Parent {} of '{}' not found", parent_id, handle.name),
                }
            }
        };

        let mut entity = self.get_entity(&existing).await?;
        if let Some(data_handle) = data_handle {
            entity["dataFileHandleId"] = json!(data_handle);
        }
        let mut path = format!(
            "/repo/v1/entity/{}?newVersion={}",
            existing, force_new_version
        );
        if !generated_by.is_empty() {
            path.push('&');
            path.push_str(&generated_by);
        }
        self.call_ok(Method::PUT, &path, Some(&entity)).await
    }
}

#[async_trait]
impl Creator for SynapseClient {
    async fn create_folder(&self, name: &str, parent: &DestHandle) -> Result<DestHandle> {
        let parent_id = parent
            .id
            .as_deref()
            .ok_or_else(|| anyhow!("Parent of folder '{}' is not stored", name))?;
        let body = json!({ "name": name, "parentId": parent_id, "concreteType": FOLDER_TYPE });
        let id = match self.call(Method::POST, "/repo/v1/entity", Some(&body)).await? {
            Reply::Ok(entity) => entity_id(&entity)?,
            Reply::Conflict => self.lookup_child(Some(parent_id), name).await?,
            Reply::NotFound => bail!("Parent {} of folder '{}' not found", parent_id, name),
        };
        debug!(folder = %name, id = %id, "folder stored");
        let mut handle = DestHandle::folder(name, parent_id);
        handle.id = Some(id);
        Ok(handle)
    }

    fn create_file(
        &self,
        name: &str,
        parent: &DestHandle,
        external_url: Option<&str>,
    ) -> Result<DestHandle> {
        let parent_id = parent
            .id
            .as_deref()
            .ok_or_else(|| anyhow!("Parent of file '{}' is not stored", name))?;
        Ok(DestHandle::file(
            name,
            parent_id,
            external_url.map(str::to_string),
        ))
    }
}

#[async_trait]
impl Persister for SynapseClient {
    async fn persist(
        &self,
        handle: &DestHandle,
        activity: Option<&Activity>,
        force_new_version: bool,
    ) -> Result<DestHandle> {
        let external_url = match &handle.kind {
            DestKind::File { external_url } => external_url.as_deref(),
            DestKind::Project => return self.ensure_project(&handle.name).await,
            DestKind::Folder => {
                if handle.is_persisted() {
                    return Ok(handle.clone());
                }
                let parent = DestHandle {
                    id: handle.parent_id.clone(),
                    ..DestHandle::project("")
                };
                return self.create_folder(&handle.name, &parent).await;
            }
        };

        let activity_id = match activity {
            Some(activity) => Some(
                self.store_activity(activity)
                    .await
                    .with_context(|| format!("Failed to store activity for '{}'", handle.name))?,
            ),
            None => None,
        };

        let entity = self
            .persist_file(handle, external_url, activity_id.as_deref(), force_new_version)
            .await?;

        let mut stored = handle.clone();
        stored.id = Some(entity_id(&entity)?);
        stored.version = entity.get("versionNumber").and_then(Value::as_u64);
        if activity_id.is_some() {
            stored.activity_id = activity_id;
        }
        debug!(file = %stored.name, id = ?stored.id, version = ?stored.version, "file stored");
        Ok(stored)
    }
}

#[async_trait]
impl ActivityStore for SynapseClient {
    async fn fetch_activity(&self, handle: &DestHandle) -> Result<ActivityLookup> {
        let Some(id) = &handle.id else {
            return Ok(ActivityLookup::NotFound);
        };
        let path = format!("/repo/v1/entity/{}/generatedBy", id);
        match self.call(Method::GET, &path, None).await? {
            Reply::Ok(value) => Ok(ActivityLookup::Found(activity_from_json(&value))),
            Reply::NotFound => Ok(ActivityLookup::NotFound),
            Reply::Conflict => bail!("Synapse GET {} conflicted (HTTP 409)", path),
        }
    }
}

fn entity_id(value: &Value) -> Result<String> {
    value
        .get("id")
        .and_then(|id| match id {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .ok_or_else(|| anyhow!("Invalid Synapse response: missing id"))
}

/// Synapse wire form of an activity (without `id`/`etag`).
pub fn activity_to_json(activity: &Activity) -> Value {
    let used: Vec<Value> = activity
        .used
        .iter()
        .map(|u| {
            json!({
                "concreteType": USED_ENTITY_TYPE,
                "reference": {
                    "targetId": u.target_id,
                    "targetVersionNumber": u.target_version,
                },
                "wasExecuted": u.was_executed,
            })
        })
        .collect();
    let mut body = json!({ "used": used });
    if let Some(name) = &activity.name {
        body["name"] = json!(name);
    }
    if let Some(description) = &activity.description {
        body["description"] = json!(description);
    }
    body
}

/// Parse a Synapse activity. References to URLs (`UsedURL`) are skipped.
pub fn activity_from_json(value: &Value) -> Activity {
    let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);
    let used = value
        .get("used")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let reference = item.get("reference")?;
                    Some(UsedEntity {
                        target_id: reference.get("targetId")?.as_str()?.to_string(),
                        target_version: reference.get("targetVersionNumber").and_then(Value::as_u64),
                        was_executed: item
                            .get("wasExecuted")
                            .and_then(Value::as_bool)
                            .unwrap_or(false),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Activity {
        id: text("id"),
        name: text("name"),
        description: text("description"),
        used,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_wire_format() {
        let mut activity = Activity::new();
        activity.name_or("generated");
        activity.used("syn12", Some(3), true);

        let body = activity_to_json(&activity);
        assert_eq!(body["name"], "generated");
        assert!(body.get("description").is_none());
        let used = &body["used"][0];
        assert_eq!(used["concreteType"], USED_ENTITY_TYPE);
        assert_eq!(used["reference"]["targetId"], "syn12");
        assert_eq!(used["reference"]["targetVersionNumber"], 3);
        assert_eq!(used["wasExecuted"], true);
    }

    #[test]
    fn parses_activity_and_skips_urls() {
        let value = json!({
            "id": "9601",
            "name": "used",
            "etag": "e1",
            "used": [
                {
                    "concreteType": USED_ENTITY_TYPE,
                    "reference": { "targetId": "syn5", "targetVersionNumber": 1 },
                    "wasExecuted": false
                },
                {
                    "concreteType": "org.sagebionetworks.repo.model.provenance.UsedURL",
                    "url": "https://example.org/script.R"
                }
            ]
        });
        let activity = activity_from_json(&value);
        assert_eq!(activity.id.as_deref(), Some("9601"));
        assert_eq!(activity.name.as_deref(), Some("used"));
        assert_eq!(
            activity.used,
            vec![UsedEntity {
                target_id: "syn5".into(),
                target_version: Some(1),
                was_executed: false,
            }]
        );
    }

    #[test]
    fn entity_id_accepts_numbers() {
        assert_eq!(entity_id(&json!({ "id": "syn1" })).unwrap(), "syn1");
        assert_eq!(entity_id(&json!({ "id": 42 })).unwrap(), "42");
        assert!(entity_id(&json!({})).is_err());
    }

    #[test]
    fn create_file_requires_stored_parent() {
        let client = SynapseClient {
            client: reqwest::Client::new(),
            endpoint: "http://localhost".into(),
            token: "t".into(),
        };
        let parent = DestHandle::folder("rawdata", "syn1");
        assert!(client.create_file("x.biom", &parent, Some("u")).is_err());

        let mut stored = parent.clone();
        stored.id = Some("syn2".into());
        let file = client
            .create_file("x.biom", &stored, Some("https://src/x"))
            .unwrap();
        assert!(!file.is_persisted());
        assert_eq!(file.parent_id.as_deref(), Some("syn2"));
        assert_eq!(
            file.kind,
            DestKind::File {
                external_url: Some("https://src/x".into())
            }
        );
    }
}
