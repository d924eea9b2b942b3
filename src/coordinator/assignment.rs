//! Deterministic job→worker assignment policy: which connected workers
//! are eligible for a job, and in what order they receive `clientNumber`.

/// What the coordinator knows about a connected worker from its
/// Client-Hello plus whatever out-of-band identity the deployment
/// attaches to that connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerDescriptor {
    pub client_id: String,
    pub version: i64,
    pub os: String,
    pub authorized: bool,
    pub restricted_mode: bool,
}

/// The `(version, OS, authorized)` predicate a job demands of a worker,
/// plus an explicit target list that restricted-mode workers must appear
/// in to be eligible at all.
#[derive(Clone, Debug, Default)]
pub struct JobRequirements {
    pub min_version: i64,
    pub os: Option<String>,
    pub requires_authorized: bool,
    pub target_client_ids: Vec<String>,
}

impl JobRequirements {
    fn matches(&self, worker: &WorkerDescriptor) -> bool {
        worker.version >= self.min_version
            && self.os.as_deref().map_or(true, |os| os == worker.os)
            && (!self.requires_authorized || worker.authorized)
    }

    fn targets(&self, worker: &WorkerDescriptor) -> bool {
        self.target_client_ids.iter().any(|id| id == &worker.client_id)
    }
}

/// Selects the first `clients_needed` eligible workers, assigning
/// `clientNumber = index` in the returned order: explicitly targeted
/// workers first (the only way a restricted-mode worker becomes
/// eligible), then general non-restricted eligible workers in candidate
/// order. `None` if fewer than `clients_needed` are eligible.
pub fn assign_clients<'a>(
    requirements: &JobRequirements,
    clients_needed: u32,
    candidates: &'a [WorkerDescriptor],
) -> Option<Vec<&'a WorkerDescriptor>> {
    let eligible = candidates.iter().filter(|w| requirements.matches(w));
    let (targeted, general): (Vec<_>, Vec<_>) = eligible.partition(|w| requirements.targets(w));
    let general_unrestricted = general.into_iter().filter(|w| !w.restricted_mode);

    let selected: Vec<&WorkerDescriptor> = targeted.into_iter().chain(general_unrestricted).collect();
    if (selected.len() as u32) < clients_needed {
        return None;
    }
    Some(selected.into_iter().take(clients_needed as usize).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker(id: &str, version: i64, os: &str, authorized: bool, restricted: bool) -> WorkerDescriptor {
        WorkerDescriptor {
            client_id: id.into(),
            version,
            os: os.into(),
            authorized,
            restricted_mode: restricted,
        }
    }

    #[test]
    fn selects_first_n_eligible_in_candidate_order() {
        let candidates = vec![
            worker("w1", 3, "linux", true, false),
            worker("w2", 3, "linux", true, false),
            worker("w3", 3, "linux", true, false),
        ];
        let req = JobRequirements::default();
        let selected = assign_clients(&req, 2, &candidates).unwrap();
        assert_eq!(selected.iter().map(|w| w.client_id.as_str()).collect::<Vec<_>>(), vec!["w1", "w2"]);
    }

    #[test]
    fn version_predicate_excludes_older_workers() {
        let candidates = vec![worker("old", 1, "linux", true, false), worker("new", 3, "linux", true, false)];
        let req = JobRequirements { min_version: 2, ..Default::default() };
        let selected = assign_clients(&req, 1, &candidates).unwrap();
        assert_eq!(selected[0].client_id, "new");
    }

    #[test]
    fn restricted_worker_is_excluded_unless_targeted() {
        let candidates = vec![worker("restricted", 3, "linux", true, true)];
        let req = JobRequirements::default();
        assert!(assign_clients(&req, 1, &candidates).is_none());

        let req_targeted = JobRequirements { target_client_ids: vec!["restricted".into()], ..Default::default() };
        let selected = assign_clients(&req_targeted, 1, &candidates).unwrap();
        assert_eq!(selected[0].client_id, "restricted");
    }

    #[test]
    fn targeted_workers_are_preferred_ahead_of_general_pool() {
        let candidates = vec![worker("general", 3, "linux", true, false), worker("named", 3, "linux", true, false)];
        let req = JobRequirements { target_client_ids: vec!["named".into()], ..Default::default() };
        let selected = assign_clients(&req, 2, &candidates).unwrap();
        assert_eq!(selected[0].client_id, "named");
    }

    #[test]
    fn insufficient_eligible_workers_yields_none() {
        let candidates = vec![worker("w1", 3, "linux", true, false)];
        let req = JobRequirements::default();
        assert!(assign_clients(&req, 2, &candidates).is_none());
    }
}
