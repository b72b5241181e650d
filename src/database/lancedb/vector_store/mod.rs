
use super::{CollectionInfo, IndexHit, IndexPoint};
use crate::database::VectorIndex;
use crate::{RecipeError, Result, config::Config};
use arrow::array::{Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use itertools::Itertools;
use lancedb::{
    Connection, DistanceType, Table,
    query::{ExecutableQuery, QueryBase},
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Vector index backed by a single LanceDB table
pub struct VectorStore {
    connection: Connection,
    table_name: String,
    dimension: usize,
}

impl VectorStore {
    /// Open the index described by `config`, creating the table if missing
    #[inline]
    pub async fn new(config: &Config) -> Result<Self> {
        Self::open(
            &config.vector_database_path(),
            &config.index.table,
            config.index.dimension as usize,
        )
        .await
    }

    /// Open or create `table_name` under `db_path`.
    ///
    /// An existing table keeps its own vector width; `dimension` only applies
    /// when the table is created here.
    #[inline]
    pub async fn open(db_path: &Path, table_name: &str, dimension: usize) -> Result<Self> {
        debug!("Initializing LanceDB at path: {:?}", db_path);

        std::fs::create_dir_all(db_path).map_err(|e| {
            RecipeError::index(
                "open",
                format!("Failed to create vector database directory: {}", e),
            )
        })?;

        let uri = db_path.display().to_string();
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| RecipeError::index("open", format!("Failed to connect: {}", e)))?;

        let mut store = Self {
            connection,
            table_name: table_name.to_string(),
            dimension,
        };
        store.initialize_table().await?;

        info!(
            "Vector index '{}' ready with {} dimensions",
            store.table_name, store.dimension
        );
        Ok(store)
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    async fn initialize_table(&mut self) -> Result<()> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RecipeError::index("open", format!("Failed to list tables: {}", e)))?;

        if table_names.contains(&self.table_name) {
            let table = self.open_table("open").await?;
            match Self::detect_vector_dimension(&table).await? {
                Some(existing) => {
                    if existing != self.dimension {
                        warn!(
                            "Table '{}' stores {}-dimensional vectors, configured {}",
                            self.table_name, existing, self.dimension
                        );
                    }
                    self.dimension = existing;
                }
                None => {
                    return Err(RecipeError::index(
                        "open",
                        format!("Table '{}' has no vector column", self.table_name),
                    ));
                }
            }
            return Ok(());
        }

        info!(
            "Creating table '{}' with {} dimensions",
            self.table_name, self.dimension
        );
        self.connection
            .create_empty_table(&self.table_name, Self::create_schema(self.dimension))
            .execute()
            .await
            .map_err(|e| RecipeError::index("open", format!("Failed to create table: {}", e)))?;

        Ok(())
    }

    async fn open_table(&self, operation: &'static str) -> Result<Table> {
        self.connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| RecipeError::index(operation, format!("Failed to open table: {}", e)))
    }

    async fn detect_vector_dimension(table: &Table) -> Result<Option<usize>> {
        let schema = table
            .schema()
            .await
            .map_err(|e| RecipeError::index("schema", e))?;

        Ok(schema
            .fields()
            .iter()
            .find(|field| field.name() == "vector")
            .and_then(|field| match field.data_type() {
                DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
                _ => None,
            }))
    }

    fn create_schema(dimension: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    dimension as i32,
                ),
                false,
            ),
            Field::new("title", DataType::Utf8, false),
            Field::new("indexed_at", DataType::Utf8, false),
        ]))
    }

    fn create_record_batch(&self, points: &[IndexPoint]) -> Result<RecordBatch> {
        if let Some(point) = points.iter().find(|p| p.vector.len() != self.dimension) {
            return Err(RecipeError::index(
                "upsert",
                format!(
                    "Recipe {} has a {}-dimensional vector, index expects {}",
                    point.id,
                    point.vector.len(),
                    self.dimension
                ),
            ));
        }

        let indexed_at = chrono::Utc::now().to_rfc3339();
        let ids: Vec<String> = points.iter().map(|p| p.id.to_string()).collect();
        let titles: Vec<&str> = points.iter().map(|p| p.title.as_str()).collect();
        let timestamps: Vec<&str> = points.iter().map(|_| indexed_at.as_str()).collect();

        let flat_values: Vec<f32> = points
            .iter()
            .flat_map(|p| p.vector.iter().copied())
            .collect();
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array = FixedSizeListArray::try_new(
            field,
            self.dimension as i32,
            Arc::new(Float32Array::from(flat_values)),
            None,
        )
        .map_err(|e| RecipeError::index("upsert", format!("Failed to build vectors: {}", e)))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(titles)),
            Arc::new(StringArray::from(timestamps)),
        ];

        RecordBatch::try_new(Self::create_schema(self.dimension), arrays)
            .map_err(|e| RecipeError::index("upsert", format!("Failed to build batch: {}", e)))
    }

    /// Insert or replace several points in one merge
    #[inline]
    pub async fn upsert_batch(&self, points: &[IndexPoint]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        let batch = self.create_record_batch(points)?;
        let table = self.open_table("upsert").await?;

        let schema = batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(batch)), schema);

        let mut merge = table.merge_insert(&["id"]);
        merge
            .when_matched_update_all(None)
            .when_not_matched_insert_all();
        merge
            .execute(Box::new(reader))
            .await
            .map_err(|e| RecipeError::index("upsert", format!("Merge insert failed: {}", e)))?;

        debug!("Upserted {} vectors", points.len());
        Ok(())
    }

    #[inline]
    pub async fn count(&self) -> Result<usize> {
        let table = self.open_table("count").await?;
        table
            .count_rows(None)
            .await
            .map_err(|e| RecipeError::index("count", e))
    }

    /// Compact fragments left behind by repeated upserts
    #[inline]
    pub async fn optimize(&self) -> Result<()> {
        let table = self.open_table("optimize").await?;
        table
            .optimize(lancedb::table::OptimizeAction::All)
            .await
            .map_err(|e| RecipeError::index("optimize", e))?;

        info!("Vector index optimization completed");
        Ok(())
    }

    fn exclusion_filter(exclude: &[i64]) -> Option<String> {
        if exclude.is_empty() {
            return None;
        }

        Some(format!(
            "id NOT IN ({})",
            exclude.iter().map(|id| format!("'{}'", id)).join(", ")
        ))
    }

    fn parse_hits(batch: &RecordBatch) -> Result<Vec<IndexHit>> {
        let ids = batch
            .column_by_name("id")
            .ok_or_else(|| RecipeError::index("query", "Missing id column"))?
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| RecipeError::index("query", "Invalid id column type"))?;

        let distances = batch
            .column_by_name("_distance")
            .ok_or_else(|| RecipeError::index("query", "Missing _distance column"))?
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| RecipeError::index("query", "Invalid _distance column type"))?;

        Ok((0..batch.num_rows())
            .filter(|row| !ids.is_null(*row))
            .map(|row| {
                let distance = if distances.is_null(row) {
                    1.0
                } else {
                    distances.value(row)
                };
                IndexHit {
                    id: ids.value(row).to_string(),
                    score: 1.0 - distance,
                    distance,
                }
            })
            .collect())
    }
}

#[async_trait]
impl VectorIndex for VectorStore {
    async fn upsert(&self, point: IndexPoint) -> Result<()> {
        self.upsert_batch(std::slice::from_ref(&point)).await
    }

    async fn query(&self, vector: &[f32], k: usize, exclude: &[i64]) -> Result<Vec<IndexHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        if vector.len() != self.dimension {
            return Err(RecipeError::index(
                "query",
                format!(
                    "Query vector has {} dimensions, index expects {}",
                    vector.len(),
                    self.dimension
                ),
            ));
        }

        let table = self.open_table("query").await?;
        let rows = table
            .count_rows(None)
            .await
            .map_err(|e| RecipeError::index("query", e))?;
        if rows == 0 {
            debug!("Vector index is empty");
            return Ok(Vec::new());
        }

        let mut query = table
            .vector_search(vector)
            .map_err(|e| RecipeError::index("query", format!("Failed to build search: {}", e)))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(k);

        if let Some(filter) = Self::exclusion_filter(exclude) {
            query = query.only_if(filter);
        }

        let mut stream = query
            .execute()
            .await
            .map_err(|e| RecipeError::index("query", format!("Search failed: {}", e)))?;

        let mut hits = Vec::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| RecipeError::index("query", format!("Failed to read results: {}", e)))?
        {
            hits.extend(Self::parse_hits(&batch)?);
        }

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);

        debug!("Vector query returned {} hits", hits.len());
        Ok(hits)
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RecipeError::index("list_collections", e))?;

        let mut collections = Vec::with_capacity(names.len());
        for name in names {
            let table = self
                .connection
                .open_table(&name)
                .execute()
                .await
                .map_err(|e| RecipeError::index("list_collections", e))?;
            let rows = table
                .count_rows(None)
                .await
                .map_err(|e| RecipeError::index("list_collections", e))?;
            let dimension = Self::detect_vector_dimension(&table).await?;

            collections.push(CollectionInfo {
                name,
                rows,
                dimension,
            });
        }

        Ok(collections)
    }
}
