use planedb::models::{
    AllocClientStatus, Allocation, EvalStatus, Evaluation, Job, JobStatus, Task, TaskState,
};
use planedb::{StateStore, WatchSet};
use std::sync::Arc;

fn job(id: &str, task_types: &[&str]) -> Job {
    Job {
        id: id.into(),
        name: id.into(),
        job_type: "batch".into(),
        tasks: task_types
            .iter()
            .map(|t| Task { task_type: (*t).into(), ..Task::default() })
            .collect(),
        ..Job::default()
    }
}

fn alloc(id: &str, job: &Arc<Job>, task: &str) -> Allocation {
    Allocation {
        id: id.into(),
        eval_id: "e1".into(),
        job_id: job.id.clone(),
        task: task.into(),
        node_id: "n1".into(),
        job: Some(Arc::clone(job)),
        ..Allocation::default()
    }
}

fn stored_job(store: &StateStore, id: &str) -> Arc<Job> {
    let mut ws = WatchSet::new();
    store.job_by_id(&mut ws, id).expect("job read").expect("job present")
}

#[test]
fn job_creation_derives_pending_status_and_summary() {
    let store = StateStore::new().expect("store");
    let mut ws = WatchSet::new();

    store.upsert_job(5, job("j1", &["t1"])).expect("upsert job");

    let j1 = stored_job(&store, "j1");
    assert_eq!(j1.status, JobStatus::Pending);
    assert_eq!(j1.create_index, 5);
    assert_eq!(j1.modify_index, 5);
    assert_eq!(j1.job_modify_index, 5);

    let summary = store
        .job_summary_by_id(&mut ws, "j1")
        .expect("summary read")
        .expect("summary present");
    assert_eq!(summary.create_index, 5);
    assert_eq!(summary.modify_index, 5);
    assert_eq!(summary.tasks.len(), 1);
    assert_eq!(summary.tasks["t1"].status, TaskState::Unset);

    assert_eq!(store.index("jobs").expect("index"), 5);
    assert_eq!(store.index("job_summary").expect("index"), 5);
}

#[test]
fn allocation_placement_transitions_job_to_running() {
    let store = StateStore::new().expect("store");
    let mut ws = WatchSet::new();

    store.upsert_job(5, job("j1", &["t1"])).expect("upsert job");
    let j1 = stored_job(&store, "j1");

    store.upsert_allocs(6, vec![alloc("a1", &j1, "t1")]).expect("upsert allocs");

    assert_eq!(stored_job(&store, "j1").status, JobStatus::Running);
    let summary = store
        .job_summary_by_id(&mut ws, "j1")
        .expect("summary read")
        .expect("summary present");
    assert_eq!(summary.tasks["t1"].status, TaskState::Starting);
    assert_eq!(summary.modify_index, 6);

    assert_eq!(store.index("allocs").expect("index"), 6);
    assert_eq!(store.index("jobs").expect("index"), 6);
    assert_eq!(store.index("job_summary").expect("index"), 6);
}

#[test]
fn client_reported_failure_kills_the_job() {
    let store = StateStore::new().expect("store");
    let mut ws = WatchSet::new();

    store.upsert_job(5, job("j1", &["t1"])).expect("upsert job");
    let j1 = stored_job(&store, "j1");
    store.upsert_allocs(6, vec![alloc("a1", &j1, "t1")]).expect("upsert allocs");

    let mut report = alloc("a1", &j1, "t1");
    report.client_status = AllocClientStatus::Failed;
    store.update_allocs_from_client(7, vec![report]).expect("client update");

    let a1 = store.alloc_by_id(&mut ws, "a1").expect("alloc read").expect("alloc");
    assert_eq!(a1.client_status, AllocClientStatus::Failed);
    assert_eq!(a1.modify_index, 7);

    // Allocations existed and all work is terminal, so the job is dead.
    assert_eq!(stored_job(&store, "j1").status, JobStatus::Dead);
    let summary = store
        .job_summary_by_id(&mut ws, "j1")
        .expect("summary read")
        .expect("summary present");
    assert_eq!(summary.tasks["t1"].status, TaskState::Failed);
}

#[test]
fn clean_completion_cancels_blocked_evals_with_trigger_attribution() {
    let store = StateStore::new().expect("store");
    let mut ws = WatchSet::new();

    store.upsert_job(5, job("j1", &["t1"])).expect("upsert job");
    store
        .upsert_evals(
            6,
            vec![Evaluation {
                id: "e_blk".into(),
                job_id: "j1".into(),
                status: EvalStatus::Blocked,
                ..Evaluation::default()
            }],
        )
        .expect("seed blocked eval");

    store
        .upsert_evals(
            8,
            vec![Evaluation {
                id: "e_ok".into(),
                job_id: "j1".into(),
                status: EvalStatus::Complete,
                ..Evaluation::default()
            }],
        )
        .expect("complete eval");

    let blocked = store
        .eval_by_id(&mut ws, "e_blk")
        .expect("eval read")
        .expect("eval present");
    assert_eq!(blocked.status, EvalStatus::Cancelled);
    assert!(blocked.status_description.contains("e_ok"));
    assert_eq!(blocked.modify_index, 8);
    assert_eq!(blocked.create_index, 6);
}

#[test]
fn paused_jobs_are_immune_to_derived_status_updates() {
    let store = StateStore::new().expect("store");

    store.upsert_job(5, job("j1", &["t1"])).expect("upsert job");
    let j1 = stored_job(&store, "j1");
    store.update_job_status(8, "j1", JobStatus::Pause).expect("pause");

    store.upsert_allocs(9, vec![alloc("a1", &j1, "t1")]).expect("upsert allocs");

    // The non-terminal allocation would force running, but pause wins.
    assert_eq!(stored_job(&store, "j1").status, JobStatus::Pause);

    // A client-side report does not unfreeze it either.
    let mut report = alloc("a1", &j1, "t1");
    report.client_status = AllocClientStatus::Running;
    store.update_allocs_from_client(10, vec![report]).expect("client update");
    assert_eq!(stored_job(&store, "j1").status, JobStatus::Pause);
}

#[test]
fn allocs_by_job_filters_stale_job_versions() {
    let store = StateStore::new().expect("store");
    let mut ws = WatchSet::new();

    store.upsert_job(5, job("j1", &["t1"])).expect("upsert job");

    // An allocation whose embedded job predates the current registration.
    let mut old_job = job("j1", &["t1"]);
    old_job.create_index = 4;
    let stale = alloc("a_old", &Arc::new(old_job), "t1");
    store.upsert_allocs(6, vec![stale]).expect("upsert allocs");

    let filtered = store.allocs_by_job(&mut ws, "j1", false).expect("filtered");
    assert!(filtered.is_empty());

    let all = store.allocs_by_job(&mut ws, "j1", true).expect("all");
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, "a_old");
}

#[test]
fn delete_eval_ignores_missing_ids_but_bumps_watermarks() {
    let store = StateStore::new().expect("store");

    store.upsert_job(5, job("j1", &["t1"])).expect("upsert job");

    store
        .delete_eval(20, &["ghost-eval".into()], &["ghost-alloc".into()])
        .expect("delete is a no-op");

    assert_eq!(store.index("evals").expect("index"), 20);
    assert_eq!(store.index("allocs").expect("index"), 20);
    // Untouched tables keep their watermarks.
    assert_eq!(store.index("jobs").expect("index"), 5);

    // And so does an entirely empty delete.
    store.delete_eval(21, &[], &[]).expect("empty delete");
    assert_eq!(store.index("evals").expect("index"), 21);
    assert_eq!(store.index("allocs").expect("index"), 21);
}

#[test]
fn eval_deletion_rederives_job_status_as_dead() {
    let store = StateStore::new().expect("store");

    store.upsert_job(5, job("j1", &["t1"])).expect("upsert job");
    store
        .upsert_evals(
            6,
            vec![Evaluation {
                id: "e1".into(),
                job_id: "j1".into(),
                status: EvalStatus::Pending,
                ..Evaluation::default()
            }],
        )
        .expect("upsert eval");
    assert_eq!(stored_job(&store, "j1").status, JobStatus::Pending);

    store.delete_eval(7, &["e1".into()], &[]).expect("delete eval");

    // Garbage collection of the last eval marks the job dead even though
    // nothing is left in either table.
    assert_eq!(stored_job(&store, "j1").status, JobStatus::Dead);
}

#[test]
fn create_index_is_stable_and_watermarks_are_monotonic() {
    let store = StateStore::new().expect("store");
    let mut ws = WatchSet::new();

    store.upsert_job(5, job("j1", &["t1"])).expect("upsert job");
    let mut last = store.index("jobs").expect("index");
    for index in [6u64, 9, 12] {
        store.upsert_job(index, job("j1", &["t1"])).expect("upsert job");
        let j1 = stored_job(&store, "j1");
        assert_eq!(j1.create_index, 5);
        assert_eq!(j1.modify_index, index);
        assert!(j1.modify_index <= store.index("jobs").expect("index"));

        let current = store.index("jobs").expect("index");
        assert!(current >= last);
        last = current;
    }

    let summary = store
        .job_summary_by_id(&mut ws, "j1")
        .expect("summary read")
        .expect("summary present");
    assert_eq!(summary.create_index, 5);
}

#[test]
fn queued_allocations_mark_summary_tasks_queued() {
    let store = StateStore::new().expect("store");
    let mut ws = WatchSet::new();

    store.upsert_job(5, job("j1", &["t1"])).expect("upsert job");
    let j1 = stored_job(&store, "j1");
    store.upsert_allocs(6, vec![alloc("a1", &j1, "t1")]).expect("upsert allocs");

    let mut eval = Evaluation {
        id: "e1".into(),
        job_id: "j1".into(),
        status: EvalStatus::Pending,
        ..Evaluation::default()
    };
    eval.queued_allocations.insert("t1".into(), 3);
    store.upsert_evals(7, vec![eval]).expect("upsert eval");

    let summary = store
        .job_summary_by_id(&mut ws, "j1")
        .expect("summary read")
        .expect("summary present");
    assert_eq!(summary.tasks["t1"].status, TaskState::Queued);
    assert_eq!(summary.modify_index, 7);
}

#[test]
fn reconcile_rebuilds_summaries_from_live_allocations() {
    let store = StateStore::new().expect("store");
    let mut ws = WatchSet::new();

    store.upsert_job(5, job("j1", &["t1", "t2"])).expect("upsert job");
    let j1 = stored_job(&store, "j1");
    store.upsert_allocs(6, vec![alloc("a1", &j1, "t1")]).expect("upsert allocs");
    let mut done = alloc("a1", &j1, "t1");
    done.client_status = AllocClientStatus::Complete;
    store.update_allocs_from_client(7, vec![done]).expect("client update");

    // A stale allocation pointing at an older job version is ignored.
    let mut old_job = job("j1", &["t1", "t2"]);
    old_job.create_index = 2;
    let mut stale = alloc("a_old", &Arc::new(old_job), "t2");
    stale.client_status = AllocClientStatus::Running;
    store.upsert_allocs(8, vec![stale]).expect("upsert stale");

    store.reconcile_job_summaries(9).expect("reconcile");

    let summary = store
        .job_summary_by_id(&mut ws, "j1")
        .expect("summary read")
        .expect("summary present");
    assert_eq!(summary.create_index, 5);
    assert_eq!(summary.modify_index, 9);
    assert_eq!(summary.tasks["t1"].status, TaskState::Complete);
    assert_eq!(summary.tasks["t2"].status, TaskState::Unset);
    assert_eq!(store.index("job_summary").expect("index"), 9);
}
