use async_trait::async_trait;
use kube_job_runner::kubernetes::orchestrator::OrchestratorResult;
use kube_job_runner::kubernetes::{
    DeleteOutcome, ExecutionUnit, JobStatus, LabelSelector, Orchestrator, UnitPhase,
    WorkloadDefinition,
};
use kube_job_runner::OrchestratorError;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::RwLock;

/// Pod the mock creates for every submitted Job.
#[derive(Clone)]
pub struct AutoUnit {
    pub suffix: String,
    pub phase: UnitPhase,
    pub log: OrchestratorResult<Vec<u8>>,
}

#[derive(Default)]
struct MockState {
    next_id: u32,
    jobs: BTreeMap<(String, String), WorkloadDefinition>,
    units: Vec<(String, ExecutionUnit)>,
    logs: HashMap<String, OrchestratorResult<Vec<u8>>>,
    container_logs: HashMap<(String, String), OrchestratorResult<Vec<u8>>>,
    auto_units: Vec<AutoUnit>,
    status_script: VecDeque<OrchestratorResult<JobStatus>>,
    last_status: JobStatus,
    status_delay: Option<Duration>,
    create_error: Option<OrchestratorError>,
    list_error: Option<OrchestratorError>,
    delete_job_error: Option<OrchestratorError>,
    delete_unit_errors: HashMap<String, OrchestratorError>,
    ignore_selector: bool,
    calls: HashMap<&'static str, usize>,
}

/// In-memory stand-in for the Kubernetes API.
///
/// Status samples are served from a script; once it runs out the last
/// successful status keeps being reported.
#[derive(Default)]
pub struct MockOrchestrator {
    state: RwLock<MockState>,
}

impl MockOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn script_statuses(&self, statuses: Vec<OrchestratorResult<JobStatus>>) {
        self.state.write().await.status_script.extend(statuses);
    }

    pub async fn add_auto_unit(&self, suffix: &str, phase: UnitPhase, log: OrchestratorResult<Vec<u8>>) {
        self.state.write().await.auto_units.push(AutoUnit {
            suffix: suffix.to_string(),
            phase,
            log,
        });
    }

    pub async fn add_unit(
        &self,
        namespace: &str,
        name: &str,
        phase: UnitPhase,
        labels: BTreeMap<String, String>,
        log: OrchestratorResult<Vec<u8>>,
    ) {
        let mut state = self.state.write().await;
        state.units.push((
            namespace.to_string(),
            ExecutionUnit {
                name: name.to_string(),
                phase,
                labels,
            },
        ));
        state.logs.insert(name.to_string(), log);
    }

    /// Override the log of one container; other containers keep the pod's log.
    pub async fn set_container_log(
        &self,
        unit_name: &str,
        container: &str,
        log: OrchestratorResult<Vec<u8>>,
    ) {
        self.state
            .write()
            .await
            .container_logs
            .insert((unit_name.to_string(), container.to_string()), log);
    }

    /// Make every status query take `delay` before answering.
    pub async fn delay_status(&self, delay: Duration) {
        self.state.write().await.status_delay = Some(delay);
    }

    pub async fn fail_create(&self, error: OrchestratorError) {
        self.state.write().await.create_error = Some(error);
    }

    pub async fn fail_list(&self, error: OrchestratorError) {
        self.state.write().await.list_error = Some(error);
    }

    pub async fn fail_delete_job(&self, error: OrchestratorError) {
        self.state.write().await.delete_job_error = Some(error);
    }

    pub async fn fail_delete_unit(&self, name: &str, error: OrchestratorError) {
        self.state
            .write()
            .await
            .delete_unit_errors
            .insert(name.to_string(), error);
    }

    /// Return every pod in the namespace from list calls, like a server that ignores selectors.
    pub async fn ignore_selector(&self) {
        self.state.write().await.ignore_selector = true;
    }

    pub async fn call_count(&self, call: &str) -> usize {
        self.state.read().await.calls.get(call).copied().unwrap_or(0)
    }

    pub async fn job_exists(&self, namespace: &str, name: &str) -> bool {
        self.state
            .read()
            .await
            .jobs
            .contains_key(&(namespace.to_string(), name.to_string()))
    }

    pub async fn job_count(&self) -> usize {
        self.state.read().await.jobs.len()
    }

    pub async fn unit_names(&self, namespace: &str) -> Vec<String> {
        self.state
            .read()
            .await
            .units
            .iter()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, unit)| unit.name.clone())
            .collect()
    }

    pub async fn units_matching(&self, namespace: &str, selector: &LabelSelector) -> usize {
        self.state
            .read()
            .await
            .units
            .iter()
            .filter(|(ns, unit)| ns == namespace && selector.matches(&unit.labels))
            .count()
    }

    pub async fn submitted_definition(&self, namespace: &str, name: &str) -> Option<WorkloadDefinition> {
        self.state
            .read()
            .await
            .jobs
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }
}

fn record(state: &mut MockState, call: &'static str) {
    *state.calls.entry(call).or_insert(0) += 1;
}

#[async_trait]
impl Orchestrator for MockOrchestrator {
    async fn create_job(
        &self,
        namespace: &str,
        definition: &WorkloadDefinition,
    ) -> OrchestratorResult<String> {
        let mut state = self.state.write().await;
        record(&mut state, "create_job");
        if let Some(error) = state.create_error.clone() {
            return Err(error);
        }

        state.next_id += 1;
        let name = format!("{}{:05}", definition.job_name_prefix(), state.next_id);
        state
            .jobs
            .insert((namespace.to_string(), name.clone()), definition.clone());

        let mut labels = definition.selector().labels().clone();
        labels.insert("job-name".to_string(), name.clone());
        for auto in state.auto_units.clone() {
            let unit_name = format!("{}-{}", name, auto.suffix);
            state.units.push((
                namespace.to_string(),
                ExecutionUnit {
                    name: unit_name.clone(),
                    phase: auto.phase,
                    labels: labels.clone(),
                },
            ));
            state.logs.insert(unit_name, auto.log);
        }

        Ok(name)
    }

    async fn get_job_status(&self, namespace: &str, name: &str) -> OrchestratorResult<JobStatus> {
        let delay = self.state.read().await.status_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.write().await;
        record(&mut state, "get_job_status");
        if !state
            .jobs
            .contains_key(&(namespace.to_string(), name.to_string()))
        {
            return Err(OrchestratorError::NotFound(format!("job {}", name)));
        }

        match state.status_script.pop_front() {
            Some(Ok(status)) => {
                state.last_status = status.clone();
                Ok(status)
            }
            Some(Err(error)) => Err(error),
            None => Ok(state.last_status.clone()),
        }
    }

    async fn list_execution_units(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> OrchestratorResult<Vec<ExecutionUnit>> {
        let mut state = self.state.write().await;
        record(&mut state, "list_execution_units");
        if let Some(error) = state.list_error.clone() {
            return Err(error);
        }

        let ignore_selector = state.ignore_selector;
        Ok(state
            .units
            .iter()
            .filter(|(ns, unit)| {
                ns == namespace && (ignore_selector || selector.matches(&unit.labels))
            })
            .map(|(_, unit)| unit.clone())
            .collect())
    }

    async fn get_logs(
        &self,
        namespace: &str,
        unit_name: &str,
        container: &str,
    ) -> OrchestratorResult<Vec<u8>> {
        let mut state = self.state.write().await;
        record(&mut state, "get_logs");
        let exists = state
            .units
            .iter()
            .any(|(ns, unit)| ns == namespace && unit.name == unit_name);
        if !exists {
            return Err(OrchestratorError::NotFound(format!("pod {}", unit_name)));
        }
        if let Some(log) = state
            .container_logs
            .get(&(unit_name.to_string(), container.to_string()))
        {
            return log.clone();
        }
        state
            .logs
            .get(unit_name)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn delete_job(&self, namespace: &str, name: &str) -> OrchestratorResult<DeleteOutcome> {
        let mut state = self.state.write().await;
        record(&mut state, "delete_job");
        if let Some(error) = state.delete_job_error.clone() {
            return Err(error);
        }

        match state.jobs.remove(&(namespace.to_string(), name.to_string())) {
            Some(_) => Ok(DeleteOutcome::Deleted),
            None => Ok(DeleteOutcome::NotFound),
        }
    }

    async fn delete_execution_unit(
        &self,
        namespace: &str,
        name: &str,
    ) -> OrchestratorResult<DeleteOutcome> {
        let mut state = self.state.write().await;
        record(&mut state, "delete_execution_unit");
        if let Some(error) = state.delete_unit_errors.get(name).cloned() {
            return Err(error);
        }

        let before = state.units.len();
        state
            .units
            .retain(|(ns, unit)| !(ns == namespace && unit.name == name));
        if state.units.len() < before {
            Ok(DeleteOutcome::Deleted)
        } else {
            Ok(DeleteOutcome::NotFound)
        }
    }
}
