//! Project membership authorization for the code-assistant config sync
//! (spec §4.6): a `user_key:project_id` bearer is split on the first `:`,
//! the user is authenticated by key, and membership (or admin ownership) of
//! the named project is required. Grounded on
//! `examples/original_source/ollama_x/api/helpers.py`'s
//! `continue_dev_auth`/`is_project_admin`.

use std::sync::Arc;

use ollamax_core::{Error, Project, Result, User};
use ollamax_store::{filter, Repository};

pub struct ProjectAuth {
    users: Arc<dyn Repository<User>>,
    projects: Arc<dyn Repository<Project>>,
}

impl ProjectAuth {
    pub fn new(users: Arc<dyn Repository<User>>, projects: Arc<dyn Repository<Project>>) -> Self {
        Self { users, projects }
    }

    /// Split `user_key:project_id`, authenticate the user by key, load the
    /// project, and deny unless the user is a member or the admin.
    pub async fn authenticate(&self, bearer: &str) -> Result<(User, Project)> {
        let (user_key, project_id) = bearer
            .split_once(':')
            .ok_or(Error::AccessDenied)?;

        let key = user_key.to_string();
        let user = self
            .users
            .find_one(filter(move |u: &User| u.key == key))
            .await
            .map_err(|_| Error::AccessDenied)?;

        let project_id = project_id.to_string();
        let project = self
            .projects
            .find_one(filter(move |p: &Project| p.id == project_id))
            .await
            .map_err(|_| Error::AccessDenied)?;

        if !project.is_member(&user.id) && project.admin != user.username {
            return Err(Error::AccessDenied);
        }

        Ok((user, project))
    }

    /// Used by project-admin-only endpoints (invite rotation, edits):
    /// membership alone is not enough, the caller must be an admin user or
    /// the project's own admin.
    pub fn require_project_admin(&self, user: &User, project: &Project) -> Result<()> {
        if user.is_admin || user.username == project.admin {
            Ok(())
        } else {
            Err(Error::AccessDenied)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ollamax_core::ProjectConfig;
    use ollamax_store::InMemoryRepository;

    struct Fixtures {
        auth: ProjectAuth,
        users: Arc<dyn Repository<User>>,
        member: User,
        project: Project,
    }

    async fn fixtures() -> Fixtures {
        let users: Arc<dyn Repository<User>> = Arc::new(InMemoryRepository::<User>::new("user"));
        let projects: Arc<dyn Repository<Project>> =
            Arc::new(InMemoryRepository::<Project>::new("project"));

        let member = User::new("member-user", Some("member-key".into()), false).unwrap();
        users.insert(member.clone()).await.unwrap();

        let mut project = Project::new("admin-user", "demo", ProjectConfig::default());
        project.users.push(member.id.clone());
        projects.insert(project.clone()).await.unwrap();

        Fixtures {
            auth: ProjectAuth::new(users.clone(), projects),
            users,
            member,
            project,
        }
    }

    #[tokio::test]
    async fn member_bearer_authenticates() {
        let f = fixtures().await;
        let bearer = format!("{}:{}", f.member.key, f.project.id);
        let (found_user, found_project) = f.auth.authenticate(&bearer).await.unwrap();
        assert_eq!(found_user.id, f.member.id);
        assert_eq!(found_project.id, f.project.id);
    }

    #[tokio::test]
    async fn unknown_key_is_denied() {
        let f = fixtures().await;
        let bearer = format!("unknown-key:{}", f.project.id);
        assert!(matches!(f.auth.authenticate(&bearer).await, Err(Error::AccessDenied)));
    }

    #[tokio::test]
    async fn known_user_outside_project_is_denied() {
        let f = fixtures().await;
        let outsider = User::new("outsider-user", Some("outsider-key".into()), false).unwrap();
        f.users.insert(outsider.clone()).await.unwrap();

        let bearer = format!("{}:{}", outsider.key, f.project.id);
        assert!(matches!(f.auth.authenticate(&bearer).await, Err(Error::AccessDenied)));
    }

    #[tokio::test]
    async fn bearer_without_separator_is_denied() {
        let f = fixtures().await;
        assert!(matches!(
            f.auth.authenticate("no-separator-here").await,
            Err(Error::AccessDenied)
        ));
    }
}
