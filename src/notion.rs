//! The slice of the Notion API the sync needs: find a book page, create a
//! book page, append blocks to it.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::blocks::Block;
use crate::error::NotionError;

pub const DEFAULT_API_URL: &str = "https://api.notion.com/v1";
pub const DEFAULT_API_VERSION: &str = "2022-06-28";
pub const BOOKMARK_EMOJI: &str = "🔖";

pub const TITLE_PROPERTY: &str = "Title";
pub const AUTHOR_PROPERTY: &str = "Author";
/// Must be a rich text column: pages are created with it as rich text and
/// lookups filter on it with the `rich_text` condition.
pub const BOOK_NAME_PROPERTY: &str = "Book Name";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Document {
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryResponse {
    pub results: Vec<Document>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryFilter {
    BookNameEquals(String),
}

impl QueryFilter {
    pub fn to_json(&self) -> Value {
        match self {
            QueryFilter::BookNameEquals(name) => json!({
                "or": [{
                    "property": BOOK_NAME_PROPERTY,
                    "rich_text": { "equals": name }
                }]
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookProperties {
    pub title: String,
    pub author: String,
    pub book_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePageParams {
    pub parent_database_id: String,
    pub properties: BookProperties,
    pub children: Vec<Block>,
    pub icon: String,
}

impl CreatePageParams {
    pub fn to_json(&self) -> Value {
        let text = |content: &str| json!([{ "type": "text", "text": { "content": content } }]);
        json!({
            "parent": { "database_id": self.parent_database_id },
            "icon": { "type": "emoji", "emoji": self.icon },
            "properties": {
                TITLE_PROPERTY: { "title": text(&self.properties.title) },
                AUTHOR_PROPERTY: { "rich_text": text(&self.properties.author) },
                BOOK_NAME_PROPERTY: { "rich_text": text(&self.properties.book_name) },
            },
            "children": self.children,
        })
    }
}

/// Remote document store the sync writes to.
#[async_trait]
pub trait DocumentService: Send + Sync {
    async fn query_database(
        &self,
        database_id: &str,
        filter: &QueryFilter,
    ) -> Result<QueryResponse, NotionError>;

    async fn create_page(&self, params: CreatePageParams) -> Result<Document, NotionError>;

    async fn append_block_children(
        &self,
        document_id: &str,
        children: Vec<Block>,
    ) -> Result<(), NotionError>;
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

pub struct NotionClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    api_version: String,
}

impl NotionClient {
    pub fn new(api_url: &str, api_key: &str, api_version: &str) -> Result<Self, NotionError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            api_version: api_version.to_string(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/{}", self.api_url, path))
            .bearer_auth(&self.api_key)
            .header("Notion-Version", &self.api_version)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, NotionError> {
        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body: ApiErrorBody = response.json().await.unwrap_or_default();
            return Err(NotionError::Api {
                status: status.as_u16(),
                code: body.code,
                message: body.message,
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl DocumentService for NotionClient {
    async fn query_database(
        &self,
        database_id: &str,
        filter: &QueryFilter,
    ) -> Result<QueryResponse, NotionError> {
        let request = self
            .request(Method::POST, &format!("databases/{}/query", database_id))
            .json(&json!({ "filter": filter.to_json() }));
        self.send(request).await
    }

    async fn create_page(&self, params: CreatePageParams) -> Result<Document, NotionError> {
        tracing::debug!(title = %params.properties.title, blocks = params.children.len(), "creating page");
        let request = self.request(Method::POST, "pages").json(&params.to_json());
        self.send(request).await
    }

    async fn append_block_children(
        &self,
        document_id: &str,
        children: Vec<Block>,
    ) -> Result<(), NotionError> {
        tracing::debug!(document_id, blocks = children.len(), "appending blocks");
        let request = self
            .request(Method::PATCH, &format!("blocks/{}/children", document_id))
            .json(&json!({ "children": children }));
        let _: Value = self.send(request).await?;
        Ok(())
    }
}
