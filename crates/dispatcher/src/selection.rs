//! Least-loaded active backend selection (spec §4.2 steps 1-5, spec §8.4).

use ollamax_core::{Backend, Error, Result};

/// A backend candidate with the queue depth observed at selection time.
pub struct Candidate<'a> {
    pub backend: &'a Backend,
    pub queue_depth: usize,
}

/// Pick the least-loaded active backend serving `model` (`None` for
/// endpoints like `/api/tags` that are not model-scoped).
///
/// Ties are broken by iteration order (spec §8.4: "with depths `0, 0` it
/// picks the first enumerated") -- `active` must therefore already be in a
/// stable, deterministic order (the registry returns backends in the order
/// the document store yields them).
pub fn select_least_loaded<'a>(
    active: &'a [Backend],
    model: Option<&str>,
    queue_depth_of: impl Fn(&Backend) -> usize,
) -> Result<&'a Backend> {
    let mut best: Option<Candidate<'a>> = None;

    for backend in active {
        if let Some(model) = model {
            if !backend.serves(model) {
                continue;
            }
        }
        let queue_depth = queue_depth_of(backend);
        let is_better = match &best {
            None => true,
            Some(current) => queue_depth < current.queue_depth,
        };
        if is_better {
            best = Some(Candidate {
                backend,
                queue_depth,
            });
        }
    }

    best.map(|c| c.backend).ok_or(Error::NoServerAvailable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn backend_with(name: &str, models: &[&str]) -> Backend {
        let mut b = Backend::new(name, format!("http://{name}"));
        b.last_alive = Some(Utc::now());
        b.models = models.iter().map(|m| m.to_string()).collect();
        b
    }

    #[test]
    fn picks_the_least_loaded_of_three() {
        let backends = vec![
            backend_with("a", &["llama3:latest"]),
            backend_with("b", &["llama3:latest"]),
            backend_with("c", &["llama3:latest"]),
        ];
        let depths = [2usize, 0, 1];
        let picked = select_least_loaded(&backends, Some("llama3"), |b| {
            depths[backends.iter().position(|x| x.id == b.id).unwrap()]
        })
        .unwrap();
        assert_eq!(picked.name, "b");
    }

    #[test]
    fn ties_break_on_iteration_order() {
        let backends = vec![backend_with("a", &["llama3:latest"]), backend_with("b", &["llama3:latest"])];
        let picked = select_least_loaded(&backends, Some("llama3"), |_| 0).unwrap();
        assert_eq!(picked.name, "a");
    }

    #[test]
    fn no_match_yields_no_server_available() {
        let backends = vec![backend_with("a", &["mistral:latest"])];
        let err = select_least_loaded(&backends, Some("llama3"), |_| 0).unwrap_err();
        assert!(matches!(err, Error::NoServerAvailable));
    }

    #[test]
    fn model_match_regex_respects_latest_suffix_and_rejects_lookalikes() {
        let backends = vec![backend_with("a", &["llama3:latest"])];
        assert!(select_least_loaded(&backends, Some("llama3"), |_| 0).is_ok());

        let backends = vec![backend_with("a", &["llama3-vision:latest"])];
        assert!(matches!(
            select_least_loaded(&backends, Some("llama3"), |_| 0),
            Err(Error::NoServerAvailable)
        ));
    }
}
