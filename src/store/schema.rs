use crate::memdb::{EncodedKey, IndexSchema, KeyBuilder, Schema, TableSchema};
use crate::models::{Allocation, EvalStatus, Evaluation, IndexEntry, Job, JobSummary, Node};
use std::sync::Arc;

pub const TABLE_NODES: &str = "nodes";
pub const TABLE_JOBS: &str = "jobs";
pub const TABLE_EVALS: &str = "evals";
pub const TABLE_ALLOCS: &str = "allocs";
pub const TABLE_JOB_SUMMARY: &str = "job_summary";
pub const TABLE_INDEX: &str = "index";

/// The one record type stored across all tables. Domain records sit behind
/// `Arc` so reads hand out shared, logically immutable values and the write
/// paths copy-on-write.
#[derive(Debug, Clone)]
pub enum StateRecord {
    Node(Arc<Node>),
    Job(Arc<Job>),
    Eval(Arc<Evaluation>),
    Alloc(Arc<Allocation>),
    Summary(Arc<JobSummary>),
    Index(IndexEntry),
}

impl StateRecord {
    pub fn into_node(self) -> Option<Arc<Node>> {
        match self {
            StateRecord::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn into_job(self) -> Option<Arc<Job>> {
        match self {
            StateRecord::Job(job) => Some(job),
            _ => None,
        }
    }

    pub fn into_eval(self) -> Option<Arc<Evaluation>> {
        match self {
            StateRecord::Eval(eval) => Some(eval),
            _ => None,
        }
    }

    pub fn into_alloc(self) -> Option<Arc<Allocation>> {
        match self {
            StateRecord::Alloc(alloc) => Some(alloc),
            _ => None,
        }
    }

    pub fn into_summary(self) -> Option<Arc<JobSummary>> {
        match self {
            StateRecord::Summary(summary) => Some(summary),
            _ => None,
        }
    }

    pub fn into_index_entry(self) -> Option<IndexEntry> {
        match self {
            StateRecord::Index(entry) => Some(entry),
            _ => None,
        }
    }
}

// Lookup-key constructors. These must mirror the keyers below exactly; the
// tests at the bottom pin that correspondence.

pub(crate) fn id_key(id: &str) -> EncodedKey {
    KeyBuilder::new().push_str(id).finish()
}

pub(crate) fn id_prefix_key(prefix: &str) -> EncodedKey {
    KeyBuilder::new().finish_str_prefix(prefix)
}

pub(crate) fn eval_job_key(job_id: &str, status: EvalStatus) -> EncodedKey {
    KeyBuilder::new()
        .push_str(job_id)
        .push_str(&status.to_string())
        .finish()
}

/// Byte prefix over the evals `job` composite using only the job id, and
/// without the field terminator: string-prefix semantics, so `"web"` also
/// matches `"web2"` and callers must filter for exact job ids.
pub(crate) fn eval_job_prefix_key(job_id: &str) -> EncodedKey {
    KeyBuilder::new().finish_str_prefix(job_id)
}

pub(crate) fn alloc_node_key(node_id: &str, terminal: bool) -> EncodedKey {
    KeyBuilder::new().push_str(node_id).push_bool(terminal).finish()
}

/// Byte prefix over the allocs `node` composite: the full node id including
/// its terminator, so only that exact node matches, any terminal flag.
pub(crate) fn alloc_node_prefix_key(node_id: &str) -> EncodedKey {
    KeyBuilder::new().push_str(node_id).finish()
}

fn node_id(record: &StateRecord) -> Option<EncodedKey> {
    match record {
        StateRecord::Node(node) => Some(id_key(&node.id)),
        _ => None,
    }
}

fn job_id(record: &StateRecord) -> Option<EncodedKey> {
    match record {
        StateRecord::Job(job) => Some(id_key(&job.id)),
        _ => None,
    }
}

fn job_type(record: &StateRecord) -> Option<EncodedKey> {
    match record {
        StateRecord::Job(job) => Some(id_key(&job.job_type)),
        _ => None,
    }
}

fn eval_id(record: &StateRecord) -> Option<EncodedKey> {
    match record {
        StateRecord::Eval(eval) => Some(id_key(&eval.id)),
        _ => None,
    }
}

fn eval_job(record: &StateRecord) -> Option<EncodedKey> {
    match record {
        StateRecord::Eval(eval) => Some(eval_job_key(&eval.job_id, eval.status)),
        _ => None,
    }
}

fn alloc_id(record: &StateRecord) -> Option<EncodedKey> {
    match record {
        StateRecord::Alloc(alloc) => Some(id_key(&alloc.id)),
        _ => None,
    }
}

fn alloc_job(record: &StateRecord) -> Option<EncodedKey> {
    match record {
        StateRecord::Alloc(alloc) => Some(id_key(&alloc.job_id)),
        _ => None,
    }
}

fn alloc_eval(record: &StateRecord) -> Option<EncodedKey> {
    match record {
        StateRecord::Alloc(alloc) => Some(id_key(&alloc.eval_id)),
        _ => None,
    }
}

fn alloc_node(record: &StateRecord) -> Option<EncodedKey> {
    match record {
        StateRecord::Alloc(alloc) => {
            Some(alloc_node_key(&alloc.node_id, alloc.terminal_status()))
        }
        _ => None,
    }
}

fn summary_id(record: &StateRecord) -> Option<EncodedKey> {
    match record {
        StateRecord::Summary(summary) => Some(id_key(&summary.job_id)),
        _ => None,
    }
}

fn index_id(record: &StateRecord) -> Option<EncodedKey> {
    match record {
        StateRecord::Index(entry) => Some(id_key(&entry.key)),
        _ => None,
    }
}

/// The state store's table and index layout. Every index also answers
/// `*_prefix` lookups by byte prefix.
pub(crate) fn state_store_schema() -> Schema<StateRecord> {
    Schema {
        tables: vec![
            TableSchema {
                name: TABLE_NODES,
                indexes: vec![IndexSchema { name: "id", unique: true, keyer: node_id }],
            },
            TableSchema {
                name: TABLE_JOBS,
                indexes: vec![
                    IndexSchema { name: "id", unique: true, keyer: job_id },
                    IndexSchema { name: "type", unique: false, keyer: job_type },
                ],
            },
            TableSchema {
                name: TABLE_EVALS,
                indexes: vec![
                    IndexSchema { name: "id", unique: true, keyer: eval_id },
                    IndexSchema { name: "job", unique: false, keyer: eval_job },
                ],
            },
            TableSchema {
                name: TABLE_ALLOCS,
                indexes: vec![
                    IndexSchema { name: "id", unique: true, keyer: alloc_id },
                    IndexSchema { name: "job", unique: false, keyer: alloc_job },
                    IndexSchema { name: "eval", unique: false, keyer: alloc_eval },
                    IndexSchema { name: "node", unique: false, keyer: alloc_node },
                ],
            },
            TableSchema {
                name: TABLE_JOB_SUMMARY,
                indexes: vec![IndexSchema { name: "id", unique: true, keyer: summary_id }],
            },
            TableSchema {
                name: TABLE_INDEX,
                indexes: vec![IndexSchema { name: "id", unique: true, keyer: index_id }],
            },
        ],
    }
}
