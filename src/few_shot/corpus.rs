//! Example corpus
//!
//! (question, query) pairs come either from the built-in set or from a MongoDB
//! collection. Loading never fails: anything wrong with the collection falls
//! back to the built-in set. The result is memoized per process.

use crate::error::{EngineError, Result};
use crate::llm::Embedding;
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::error::ErrorKind;
use mongodb::options::{ClientOptions, FindOptions};
use mongodb::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{info, warn};

pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub id: String,
    #[serde(rename = "natural_language_query", alias = "question")]
    pub question: String,
    pub query: String,
    #[serde(skip)]
    pub embedding: Option<Embedding>,
}

impl Example {
    pub fn new(id: impl Into<String>, question: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            question: question.into(),
            query: query.into(),
            embedding: None,
        }
    }
}

/// Built-in examples used when no remote collection is configured or reachable.
pub fn local_examples() -> Vec<Example> {
    vec![
        Example::new(
            "local-1",
            "Hoe vaak heeft Feyenoord gewonnen van Ajax?",
            "SELECT COUNT(*) FROM matches WHERE (((homeClubName = 'Feyenoord' OR homeClubId = (SELECT clubId FROM clubs WHERE clubName='Feyenoord')) AND (awayClubName = 'Ajax' OR awayClubId = (SELECT clubId from clubs WHERE clubName='Ajax')) AND homeClubFinalScore > awayClubFinalScore) OR ((homeClubName = 'Ajax' OR homeClubId = (SELECT clubId FROM clubs WHERE clubName='Ajax')) AND (awayClubName = 'Feyenoord' OR awayClubId = (SELECT clubId FROM clubs WHERE clubName='Feyenoord')) AND awayClubFinalScore > homeClubFinalScore));",
        ),
        Example::new(
            "local-2",
            "Hoe vaak hebben Coen Moulijn en Sjaak Swart tegelijk in een wedstrijd gescoord?",
            "SELECT p1.playerName AS player1, p2.playerName AS player2, COUNT(DISTINCT g1.matchId) AS matches_together FROM goals g1 JOIN goals g2 ON g1.matchId = g2.matchId AND g1.playerId != g2.playerId JOIN players p1 ON g1.playerId = p1.playerId JOIN players p2 ON g2.playerId = p2.playerId WHERE (p1.playerName = 'Coen Moulijn' AND p2.playerName = 'Sjaak Swart') OR (p1.playerName = 'Sjaak Swart' AND p2.playerName = 'Coen Moulijn') GROUP BY player1, player2;",
        ),
        Example::new(
            "local-3",
            "Wat is de grootste overwinning van Feyenoord op PSV?",
            "SELECT m.dateAndTime, m.homeClubName, m.awayClubName, m.homeClubFinalScore, m.awayClubFinalScore FROM matches m WHERE (((homeClubName = 'Feyenoord' OR homeClubId = (SELECT clubId FROM clubs WHERE clubName='Feyenoord')) AND (awayClubName = 'PSV' OR awayClubId = (SELECT clubId from clubs WHERE clubName='PSV')) AND homeClubFinalScore > awayClubFinalScore) OR ((homeClubName = 'PSV' OR homeClubId = (SELECT clubId FROM clubs WHERE clubName='PSV')) AND (awayClubName = 'Feyenoord' OR awayClubId = (SELECT clubId FROM clubs WHERE clubName='Feyenoord')) AND awayClubFinalScore > homeClubFinalScore)) ORDER BY ABS(m.homeClubFinalScore - m.awayClubFinalScore) DESC, MAX(m.homeClubFinalScore, m.awayClubFinalScore) ASC, m.dateAndTime ASC LIMIT 5;",
        ),
    ]
}

/// MongoDB collection holding example documents.
#[derive(Debug, Clone)]
pub struct RemoteCollection {
    pub connection_string: String,
    pub database: String,
    pub collection: String,
    /// Bound on connecting and on server selection.
    pub timeout: Duration,
}

impl RemoteCollection {
    fn namespace(&self) -> String {
        format!("{}/{}", self.database, self.collection)
    }

    async fn client(&self) -> Result<Client> {
        let mut options = ClientOptions::parse(&self.connection_string)
            .await
            .map_err(|e| EngineError::Corpus(format!("MongoDB configuration error (check connection string?): {}", e)))?;
        options.server_selection_timeout = Some(self.timeout);
        options.connect_timeout = Some(self.timeout);
        Client::with_options(options).map_err(|e| EngineError::Corpus(format!("Failed to create MongoDB client: {}", e)))
    }

    /// Fetch and validate documents. `Ok` may still be empty.
    pub async fn fetch(&self) -> Result<Vec<Example>> {
        info!("Attempting to connect to MongoDB: {}", self.namespace());
        let client = self.client().await?;

        client
            .database("admin")
            .run_command(doc! { "ismaster": 1 }, None)
            .await
            .map_err(|e| self.connection_error(e))?;
        info!("MongoDB connection successful.");

        let projection = doc! { "_id": 0, "natural_language_query": 1, "query": 1 };
        let cursor = client
            .database(&self.database)
            .collection::<Document>(&self.collection)
            .find(None, FindOptions::builder().projection(projection).build())
            .await
            .map_err(|e| self.connection_error(e))?;
        let documents: Vec<Document> = cursor
            .try_collect()
            .await
            .map_err(|e| EngineError::Corpus(format!("Failed to read example documents: {}", e)))?;

        let documents: Vec<Value> = documents
            .into_iter()
            .map(|document| Bson::Document(document).into_relaxed_extjson())
            .collect();
        Ok(parse_documents(&documents))
    }

    fn connection_error(&self, e: mongodb::error::Error) -> EngineError {
        if matches!(*e.kind, ErrorKind::ServerSelection { .. }) {
            EngineError::Timeout {
                operation: "example collection connect",
                elapsed: self.timeout,
            }
        } else {
            EngineError::Corpus(format!("Error fetching examples from {}: {}", self.namespace(), e))
        }
    }
}

/// Entries missing a question or query are dropped; missing ids become `db-{n}`.
pub fn parse_documents(documents: &[Value]) -> Vec<Example> {
    let mut examples = Vec::with_capacity(documents.len());
    for (position, document) in documents.iter().enumerate() {
        let question = document
            .get("natural_language_query")
            .or_else(|| document.get("question"))
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty());
        let query = document
            .get("query")
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty());

        match (question, query) {
            (Some(question), Some(query)) => {
                let id = match document.get("id") {
                    Some(Value::String(id)) if !id.is_empty() => id.clone(),
                    Some(Value::Number(id)) => id.to_string(),
                    _ => format!("db-{}", examples.len() + 1),
                };
                examples.push(Example::new(id, question, query));
            }
            _ => warn!("Skipping example document {} without question/query fields", position + 1),
        }
    }
    examples
}

#[derive(Debug, Clone)]
pub enum CorpusSource {
    Local,
    Remote(RemoteCollection),
}

/// Memoized example corpus.
pub struct ExampleCorpus {
    source: CorpusSource,
    examples: OnceCell<Arc<Vec<Example>>>,
}

impl ExampleCorpus {
    pub fn new(source: CorpusSource) -> Self {
        Self {
            source,
            examples: OnceCell::new(),
        }
    }

    /// A corpus fixed up front, e.g. examples supplied by the caller.
    pub fn fixed(examples: Vec<Example>) -> Self {
        Self {
            source: CorpusSource::Local,
            examples: OnceCell::new_with(Some(Arc::new(examples))),
        }
    }

    pub fn source(&self) -> &CorpusSource {
        &self.source
    }

    /// Load once; concurrent first callers share the same load.
    pub async fn load(&self) -> Arc<Vec<Example>> {
        self.examples
            .get_or_init(|| async { Arc::new(load_from(&self.source).await) })
            .await
            .clone()
    }
}

async fn load_from(source: &CorpusSource) -> Vec<Example> {
    match source {
        CorpusSource::Local => {
            let examples = local_examples();
            info!("Using {} local examples", examples.len());
            examples
        }
        CorpusSource::Remote(remote) => or_local(&remote.namespace(), remote.fetch().await),
    }
}

/// The fetched examples, or the built-in set when the fetch failed or came back empty.
fn or_local(namespace: &str, fetched: Result<Vec<Example>>) -> Vec<Example> {
    match fetched {
        Ok(examples) if !examples.is_empty() => {
            info!("Using {} examples loaded from MongoDB {}", examples.len(), namespace);
            examples
        }
        Ok(_) => {
            warn!("MongoDB query returned no valid examples from {}. Falling back to local examples.", namespace);
            local_examples()
        }
        Err(e) => {
            warn!("Failed to load examples from MongoDB: {}. Falling back to local examples.", e);
            local_examples()
        }
    }
}
