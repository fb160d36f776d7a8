//! Postgres + pgvector backed `GraphStore` (§6.5 graph store expectations).
//!
//! The corpus graph is modeled relationally: `provisions`/`documents`/
//! `section_containers` tables for nodes, `hierarchy_edges`/
//! `cross_document_edges`/`assignment_edges` for edges, with `pgvector`
//! columns for the node- and relation-space embeddings. Similarity queries
//! use `ORDER BY embedding <=> $1` with a `filter`/threshold applied in the
//! `WHERE` clause.

use async_trait::async_trait;
use pgvector::Vector;
use retrieval_types::graph::{EdgeKind, Neighbor, SemanticType};
use retrieval_types::provision::{Provision, ProvisionId};
use retrieval_types::DomainInfo;
use sqlx::PgPool;
use tracing::instrument;

use crate::error::{GraphStoreError, GraphStoreResult};
use crate::retry::with_retry;
use crate::{GraphStore, MemberFilter, ScoredId};

pub struct PgGraphStore {
    pool: PgPool,
    retry_max: u32,
}

impl PgGraphStore {
    pub fn new(pool: PgPool, retry_max: u32) -> Self {
        Self { pool, retry_max }
    }
}

fn row_to_provision(
    id: String,
    content: String,
    node_embedding: Option<Vector>,
    secondary_embedding: Option<Vector>,
    document_title: Option<String>,
    provision_path: Option<String>,
    provision_number: Option<String>,
) -> Provision {
    Provision {
        id,
        content,
        node_embedding: node_embedding.map(|v| v.to_vec()),
        secondary_embedding: secondary_embedding.map(|v| v.to_vec()),
        document_title: document_title.unwrap_or_default(),
        provision_path: provision_path.unwrap_or_default(),
        provision_number: provision_number.unwrap_or_default(),
    }
}

#[async_trait]
impl GraphStore for PgGraphStore {
    #[instrument(skip(self))]
    async fn get_provision(&self, id: &str) -> GraphStoreResult<Provision> {
        with_retry(self.retry_max, || async {
            let row = sqlx::query_as::<
                _,
                (
                    String,
                    String,
                    Option<Vector>,
                    Option<Vector>,
                    Option<String>,
                    Option<String>,
                    Option<String>,
                ),
            >(
                r#"
                SELECT id, content, node_embedding, secondary_embedding,
                       document_title, provision_path, provision_number
                FROM provisions
                WHERE id = $1
                "#,
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

            row.map(|r| row_to_provision(r.0, r.1, r.2, r.3, r.4, r.5, r.6))
                .ok_or_else(|| GraphStoreError::NotFound(id.to_string()))
        })
        .await
    }

    #[instrument(skip(self, ids))]
    async fn batch_get_provisions(&self, ids: &[ProvisionId]) -> GraphStoreResult<Vec<Provision>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        with_retry(self.retry_max, || async {
            let rows = sqlx::query_as::<
                _,
                (
                    String,
                    String,
                    Option<Vector>,
                    Option<Vector>,
                    Option<String>,
                    Option<String>,
                    Option<String>,
                ),
            >(
                r#"
                SELECT id, content, node_embedding, secondary_embedding,
                       document_title, provision_path, provision_number
                FROM provisions
                WHERE id = ANY($1)
                "#,
            )
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;

            let by_id: std::collections::HashMap<String, Provision> = rows
                .into_iter()
                .map(|r| {
                    let p = row_to_provision(r.0.clone(), r.1, r.2, r.3, r.4, r.5, r.6);
                    (r.0, p)
                })
                .collect();

            Ok(ids.iter().filter_map(|id| by_id.get(id).cloned()).collect())
        })
        .await
    }

    #[instrument(skip(self, query_vec, filter))]
    async fn vector_search_provisions(
        &self,
        query_vec: &[f32],
        k: usize,
        filter: MemberFilter<'_>,
    ) -> GraphStoreResult<Vec<ScoredId>> {
        let vec = Vector::from(query_vec.to_vec());
        with_retry(self.retry_max, || async {
            let rows: Vec<(String, f32)> = match filter {
                Some(ids) => {
                    let ids: Vec<String> = ids.iter().cloned().collect();
                    sqlx::query_as(
                        r#"
                        SELECT id, 1 - (node_embedding <=> $1::vector) AS similarity
                        FROM provisions
                        WHERE node_embedding IS NOT NULL AND id = ANY($2)
                        ORDER BY node_embedding <=> $1::vector
                        LIMIT $3
                        "#,
                    )
                    .bind(&vec)
                    .bind(&ids)
                    .bind(k as i64)
                    .fetch_all(&self.pool)
                    .await?
                }
                None => {
                    sqlx::query_as(
                        r#"
                        SELECT id, 1 - (node_embedding <=> $1::vector) AS similarity
                        FROM provisions
                        WHERE node_embedding IS NOT NULL
                        ORDER BY node_embedding <=> $1::vector
                        LIMIT $2
                        "#,
                    )
                    .bind(&vec)
                    .bind(k as i64)
                    .fetch_all(&self.pool)
                    .await?
                }
            };
            Ok(rows)
        })
        .await
    }

    #[instrument(skip(self, query_vec))]
    async fn vector_search_relations(
        &self,
        query_vec: &[f32],
        k: usize,
    ) -> GraphStoreResult<Vec<ScoredId>> {
        let vec = Vector::from(query_vec.to_vec());
        with_retry(self.retry_max, || async {
            let rows: Vec<(String, f32)> = sqlx::query_as(
                r#"
                SELECT child_id, 1 - (relation_embedding <=> $1::vector) AS similarity
                FROM hierarchy_edges
                WHERE relation_embedding IS NOT NULL
                ORDER BY relation_embedding <=> $1::vector
                LIMIT $2
                "#,
            )
            .bind(&vec)
            .bind(k as i64)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn get_neighbors(&self, provision_id: &str) -> GraphStoreResult<Vec<Neighbor>> {
        with_retry(self.retry_max, || async {
            let mut neighbors = Vec::new();

            let parent: Option<(String, Option<Vector>, Option<String>, Option<Vec<f32>>)> = sqlx::query_as(
                r#"
                SELECT h.parent_id, h.relation_embedding, h.semantic_type, p.node_embedding
                FROM hierarchy_edges h
                JOIN provisions p ON p.id = h.parent_id
                WHERE h.child_id = $1
                "#,
            )
            .bind(provision_id)
            .fetch_optional(&self.pool)
            .await?;

            if let Some((parent_id, rel_emb, sem_type, node_emb)) = parent {
                neighbors.push(Neighbor {
                    id: parent_id.clone(),
                    kind: EdgeKind::Parent,
                    relation_embedding: rel_emb.map(|v| v.to_vec()),
                    semantic_type: sem_type.and_then(|s| parse_semantic_type(&s)),
                    node_embedding: node_emb,
                });

                let siblings: Vec<(String, Option<Vector>, Option<String>, Option<Vec<f32>>)> = sqlx::query_as(
                    r#"
                    SELECT h.child_id, h.relation_embedding, h.semantic_type, p.node_embedding
                    FROM hierarchy_edges h
                    JOIN provisions p ON p.id = h.child_id
                    WHERE h.parent_id = $1 AND h.child_id != $2
                    "#,
                )
                .bind(&parent_id)
                .bind(provision_id)
                .fetch_all(&self.pool)
                .await?;

                for (id, rel_emb, sem_type, node_emb) in siblings {
                    neighbors.push(Neighbor {
                        id,
                        kind: EdgeKind::Sibling,
                        relation_embedding: rel_emb.map(|v| v.to_vec()),
                        semantic_type: sem_type.and_then(|s| parse_semantic_type(&s)),
                        node_embedding: node_emb,
                    });
                }
            }

            let children: Vec<(String, Option<Vector>, Option<String>, Option<Vec<f32>>)> = sqlx::query_as(
                r#"
                SELECT h.child_id, h.relation_embedding, h.semantic_type, p.node_embedding
                FROM hierarchy_edges h
                JOIN provisions p ON p.id = h.child_id
                WHERE h.parent_id = $1
                "#,
            )
            .bind(provision_id)
            .fetch_all(&self.pool)
            .await?;

            for (id, rel_emb, sem_type, node_emb) in children {
                neighbors.push(Neighbor {
                    id,
                    kind: EdgeKind::Child,
                    relation_embedding: rel_emb.map(|v| v.to_vec()),
                    semantic_type: sem_type.and_then(|s| parse_semantic_type(&s)),
                    node_embedding: node_emb,
                });
            }

            let cross_doc: Vec<(String,)> = sqlx::query_as(
                r#"
                SELECT CASE WHEN provision_a = $1 THEN provision_b ELSE provision_a END
                FROM cross_document_edges
                WHERE provision_a = $1 OR provision_b = $1
                "#,
            )
            .bind(provision_id)
            .fetch_all(&self.pool)
            .await?;

            for (id,) in cross_doc {
                neighbors.push(Neighbor {
                    id,
                    kind: EdgeKind::CrossDocument,
                    relation_embedding: None,
                    semantic_type: None,
                    node_embedding: None,
                });
            }

            Ok(neighbors)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn find_by_identifier_pattern(&self, pattern: &str) -> GraphStoreResult<Vec<Provision>> {
        with_retry(self.retry_max, || async {
            let rows = sqlx::query_as::<
                _,
                (
                    String,
                    String,
                    Option<Vector>,
                    Option<Vector>,
                    Option<String>,
                    Option<String>,
                    Option<String>,
                ),
            >(
                r#"
                SELECT id, content, node_embedding, secondary_embedding,
                       document_title, provision_path, provision_number
                FROM provisions
                WHERE provision_number ~ $1 OR id ~ $1
                ORDER BY id
                "#,
            )
            .bind(pattern)
            .fetch_all(&self.pool)
            .await?;

            Ok(rows
                .into_iter()
                .map(|r| row_to_provision(r.0, r.1, r.2, r.3, r.4, r.5, r.6))
                .collect())
        })
        .await
    }

    #[instrument(skip(self, domain))]
    async fn upsert_domain(&self, domain: &DomainInfo) -> GraphStoreResult<()> {
        let centroid = Vector::from(domain.centroid.clone());
        with_retry(self.retry_max, || async {
            sqlx::query(
                r#"
                INSERT INTO domains (id, label, cardinality, centroid, neighbor_domains, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (id) DO UPDATE
                SET label = $2, cardinality = $3, centroid = $4, neighbor_domains = $5, updated_at = $7
                "#,
            )
            .bind(&domain.id)
            .bind(&domain.label)
            .bind(domain.cardinality as i64)
            .bind(&centroid)
            .bind(&domain.neighbor_domains)
            .bind(domain.created_at)
            .bind(domain.updated_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    #[instrument(skip(self, provision_ids, similarities))]
    async fn replace_assignments(
        &self,
        domain_id: &str,
        provision_ids: &[ProvisionId],
        similarities: &[f32],
    ) -> GraphStoreResult<()> {
        if provision_ids.len() != similarities.len() {
            return Err(GraphStoreError::ConstraintViolation(
                "provision_ids and similarities must have equal length".into(),
            ));
        }
        with_retry(self.retry_max, || async {
            let mut tx = self.pool.begin().await?;
            sqlx::query("DELETE FROM assignment_edges WHERE provision_id = ANY($1)")
                .bind(provision_ids)
                .execute(&mut *tx)
                .await?;
            for (pid, sim) in provision_ids.iter().zip(similarities) {
                sqlx::query(
                    r#"
                    INSERT INTO assignment_edges (provision_id, domain_id, similarity)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (provision_id) DO UPDATE SET domain_id = $2, similarity = $3
                    "#,
                )
                .bind(pid)
                .bind(domain_id)
                .bind(sim)
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;
            Ok(())
        })
        .await
    }

    #[instrument(skip(self))]
    async fn delete_domain(&self, domain_id: &str) -> GraphStoreResult<()> {
        with_retry(self.retry_max, || async {
            let (remaining,): (i64,) =
                sqlx::query_as("SELECT count(*) FROM assignment_edges WHERE domain_id = $1")
                    .bind(domain_id)
                    .fetch_one(&self.pool)
                    .await?;
            if remaining > 0 {
                return Err(GraphStoreError::ConstraintViolation(format!(
                    "domain {domain_id} still has {remaining} assigned provision(s)"
                )));
            }
            sqlx::query("DELETE FROM domains WHERE id = $1")
                .bind(domain_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }

    #[instrument(skip(self))]
    async fn list_domains(&self) -> GraphStoreResult<Vec<DomainInfo>> {
        with_retry(self.retry_max, || async {
            let rows: Vec<(
                String,
                String,
                i64,
                Vector,
                Vec<String>,
                chrono::DateTime<chrono::Utc>,
                chrono::DateTime<chrono::Utc>,
            )> = sqlx::query_as("SELECT id, label, cardinality, centroid, neighbor_domains, created_at, updated_at FROM domains")
                .fetch_all(&self.pool)
                .await?;
            Ok(rows
                .into_iter()
                .map(|(id, label, cardinality, centroid, neighbor_domains, created_at, updated_at)| DomainInfo {
                    id,
                    label,
                    cardinality: cardinality as usize,
                    centroid: centroid.to_vec(),
                    neighbor_domains,
                    created_at,
                    updated_at,
                })
                .collect())
        })
        .await
    }

    #[instrument(skip(self))]
    async fn count_embedded_provisions(&self) -> GraphStoreResult<usize> {
        with_retry(self.retry_max, || async {
            let (count,): (i64,) =
                sqlx::query_as("SELECT count(*) FROM provisions WHERE node_embedding IS NOT NULL")
                    .fetch_one(&self.pool)
                    .await?;
            Ok(count as usize)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn members_of(&self, domain_id: &str) -> GraphStoreResult<Vec<ProvisionId>> {
        with_retry(self.retry_max, || async {
            let rows: Vec<(String,)> =
                sqlx::query_as("SELECT provision_id FROM assignment_edges WHERE domain_id = $1")
                    .bind(domain_id)
                    .fetch_all(&self.pool)
                    .await?;
            Ok(rows.into_iter().map(|(id,)| id).collect())
        })
        .await
    }

    #[instrument(skip(self))]
    async fn sample_node_embeddings(
        &self,
        limit: usize,
        domain_id: Option<&str>,
    ) -> GraphStoreResult<Vec<(ProvisionId, Vec<f32>)>> {
        with_retry(self.retry_max, || async {
            let rows: Vec<(String, Vector)> = match domain_id {
                Some(domain_id) => {
                    sqlx::query_as(
                        r#"
                        SELECT p.id, p.node_embedding
                        FROM provisions p
                        JOIN assignment_edges a ON a.provision_id = p.id
                        WHERE p.node_embedding IS NOT NULL AND a.domain_id = $1
                        ORDER BY p.id
                        LIMIT $2
                        "#,
                    )
                    .bind(domain_id)
                    .bind(limit as i64)
                    .fetch_all(&self.pool)
                    .await?
                }
                None => {
                    sqlx::query_as(
                        r#"
                        SELECT id, node_embedding
                        FROM provisions
                        WHERE node_embedding IS NOT NULL
                        ORDER BY id
                        LIMIT $1
                        "#,
                    )
                    .bind(limit as i64)
                    .fetch_all(&self.pool)
                    .await?
                }
            };
            Ok(rows.into_iter().map(|(id, v)| (id, v.to_vec())).collect())
        })
        .await
    }
}

fn parse_semantic_type(s: &str) -> Option<SemanticType> {
    match s {
        "detail" => Some(SemanticType::Detail),
        "exception" => Some(SemanticType::Exception),
        "reference" => Some(SemanticType::Reference),
        "condition" => Some(SemanticType::Condition),
        "addition" => Some(SemanticType::Addition),
        "general" => Some(SemanticType::General),
        _ => None,
    }
}
