//! Tantivy-based search index module.
//!
//! Full-text search over bot names, developers, descriptions and hosts with field boosting.

use std::path::Path;
use std::sync::Arc;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, BoostQuery, Occur, QueryParser};
use tantivy::schema::{Field, Schema, Value, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument};
use tokio::sync::RwLock;

use crate::errors::AppError;
use crate::models::{Bot, DeveloperProfile};

/// Field boost values.
const BOOST_NAME: f32 = 10.0;
const BOOST_DEVELOPER: f32 = 8.0;
const BOOST_DESCRIPTION: f32 = 6.0;
const BOOST_HOSTS: f32 = 3.0;

/// Search result with bot and relevance score.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub bot_id: String,
    pub score: f32,
}

/// Search index schema fields.
struct SearchFields {
    bot_id: Field,
    name: Field,
    developer: Field,
    description: Field,
    hosts: Field,
}

/// Tantivy search index for bots.
pub struct SearchIndex {
    index: Index,
    reader: IndexReader,
    writer: Arc<RwLock<IndexWriter>>,
    fields: SearchFields,
}

impl SearchIndex {
    /// Create or open a search index at the specified path.
    pub fn open(index_path: &Path) -> Result<Self, AppError> {
        std::fs::create_dir_all(index_path)
            .map_err(|e| AppError::Search(format!("Failed to create index directory: {}", e)))?;

        // Define schema
        let mut schema_builder = Schema::builder();
        let bot_id = schema_builder.add_text_field("bot_id", STRING | STORED);
        let name = schema_builder.add_text_field("name", TEXT | STORED);
        let developer = schema_builder.add_text_field("developer", TEXT);
        let description = schema_builder.add_text_field("description", TEXT);
        let hosts = schema_builder.add_text_field("hosts", TEXT);
        let schema = schema_builder.build();

        let fields = SearchFields {
            bot_id,
            name,
            developer,
            description,
            hosts,
        };

        // Try to open existing index or create new one
        let index = Index::open_in_dir(index_path)
            .or_else(|_| Index::create_in_dir(index_path, schema.clone()))
            .map_err(|e| AppError::Search(format!("Failed to open/create index: {}", e)))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .map_err(|e| AppError::Search(format!("Failed to create reader: {}", e)))?;

        let writer = index
            .writer(50_000_000) // 50MB buffer
            .map_err(|e| AppError::Search(format!("Failed to create writer: {}", e)))?;

        Ok(Self {
            index,
            reader,
            writer: Arc::new(RwLock::new(writer)),
            fields,
        })
    }

    /// Rebuild the entire index from the catalog.
    pub async fn rebuild(
        &self,
        entries: &[(Bot, Option<DeveloperProfile>)],
    ) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        // Clear existing index
        writer.delete_all_documents()?;

        for (bot, profile) in entries {
            writer.add_document(self.create_document(bot, profile.as_ref()))?;
        }

        writer.commit()?;

        // Reload reader to see new documents
        self.reader.reload()?;

        tracing::info!("Search index rebuilt with {} bots", entries.len());
        Ok(())
    }

    /// Index a single bot, replacing any previous document for it.
    pub async fn index_bot(
        &self,
        bot: &Bot,
        profile: Option<&DeveloperProfile>,
    ) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        let term = tantivy::Term::from_field_text(self.fields.bot_id, &bot.bot_id);
        writer.delete_term(term);

        writer.add_document(self.create_document(bot, profile))?;
        writer.commit()?;

        self.reader.reload()?;

        Ok(())
    }

    /// Remove a bot from the index.
    pub async fn remove_bot(&self, bot_id: &str) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        let term = tantivy::Term::from_field_text(self.fields.bot_id, bot_id);
        writer.delete_term(term);
        writer.commit()?;

        self.reader.reload()?;

        Ok(())
    }

    /// Search for bots matching the query.
    pub fn search(&self, query_str: &str, limit: usize) -> Result<Vec<SearchResult>, AppError> {
        if query_str.trim().is_empty() {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();

        let query_parser = QueryParser::for_index(
            &self.index,
            vec![
                self.fields.name,
                self.fields.developer,
                self.fields.description,
                self.fields.hosts,
            ],
        );

        let base_query = query_parser
            .parse_query(query_str)
            .map_err(|e| AppError::Validation(format!("Invalid search query: {}", e)))?;

        let mut subqueries: Vec<(Occur, Box<dyn tantivy::query::Query>)> = Vec::new();

        let field_queries = [
            (self.fields.name, BOOST_NAME),
            (self.fields.developer, BOOST_DEVELOPER),
            (self.fields.description, BOOST_DESCRIPTION),
            (self.fields.hosts, BOOST_HOSTS),
        ];

        for (field, boost) in field_queries {
            let field_parser = QueryParser::for_index(&self.index, vec![field]);
            if let Ok(field_query) = field_parser.parse_query(query_str) {
                let boosted = BoostQuery::new(field_query, boost);
                subqueries.push((Occur::Should, Box::new(boosted)));
            }
        }

        let combined_query = if subqueries.is_empty() {
            base_query
        } else {
            Box::new(BooleanQuery::new(subqueries))
        };

        let top_docs = searcher
            .search(&combined_query, &TopDocs::with_limit(limit))
            .map_err(|e| AppError::Search(format!("Search failed: {}", e)))?;

        let results: Vec<SearchResult> = top_docs
            .into_iter()
            .filter_map(|(score, doc_address)| {
                let doc: TantivyDocument = searcher.doc(doc_address).ok()?;
                let bot_id = doc.get_first(self.fields.bot_id)?.as_str()?.to_string();
                Some(SearchResult { bot_id, score })
            })
            .collect();

        Ok(results)
    }

    fn create_document(&self, bot: &Bot, profile: Option<&DeveloperProfile>) -> TantivyDocument {
        let mut developer = vec![bot.developer_name.clone().unwrap_or_default()];
        if let Some(profile) = profile {
            developer.push(profile.developer_name.clone().unwrap_or_default());
            developer.push(profile.description.clone().unwrap_or_default());
        }

        let hosts: Vec<&str> = bot.deployment_hosts.iter().map(|h| h.as_str()).collect();

        doc!(
            self.fields.bot_id => bot.bot_id.clone(),
            self.fields.name => bot.name.clone(),
            self.fields.developer => developer.join(" "),
            self.fields.description => bot.description.clone().unwrap_or_default(),
            self.fields.hosts => hosts.join(" ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BotStatus, DeploymentHost};
    use tempfile::TempDir;

    fn create_test_bot(id: &str, name: &str, description: &str) -> Bot {
        Bot {
            bot_id: id.to_string(),
            name: name.to_string(),
            developer_name: None,
            version: None,
            description: Some(description.to_string()),
            status: BotStatus::Online,
            deployment_hosts: vec![DeploymentHost::Railway],
            image_url: None,
            archive_url: None,
            github_url: None,
            developer_site: None,
            posted_by: "ada".to_string(),
            created_at: "2024-01-01T00:00:00Z".to_string(),
            updated_at: "2024-01-01T00:00:00Z".to_string(),
            revision: 1,
        }
    }

    #[tokio::test]
    async fn test_search_index_creation() {
        let temp_dir = TempDir::new().unwrap();
        let index = SearchIndex::open(temp_dir.path()).unwrap();

        let entries = vec![
            (
                create_test_bot("1", "WeatherBot", "Daily weather forecasts"),
                None,
            ),
            (create_test_bot("2", "MusicBot", "Plays music in voice chat"), None),
        ];

        index.rebuild(&entries).await.unwrap();

        let results = index.search("weather", 10).unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].bot_id, "1");
    }

    #[tokio::test]
    async fn test_remove_and_reindex() {
        let temp_dir = TempDir::new().unwrap();
        let index = SearchIndex::open(temp_dir.path()).unwrap();

        let bot = create_test_bot("1", "WeatherBot", "forecasts");
        index.index_bot(&bot, None).await.unwrap();
        assert_eq!(index.search("weatherbot", 10).unwrap().len(), 1);

        // Re-indexing replaces rather than duplicates
        index.index_bot(&bot, None).await.unwrap();
        assert_eq!(index.search("weatherbot", 10).unwrap().len(), 1);

        index.remove_bot("1").await.unwrap();
        assert!(index.search("weatherbot", 10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_empty_query() {
        let temp_dir = TempDir::new().unwrap();
        let index = SearchIndex::open(temp_dir.path()).unwrap();

        let results = index.search("", 10).unwrap();
        assert!(results.is_empty());
    }
}
