//! `Entity` impls wiring the domain types in `ollamax-core` into the
//! repository layer: which field(s) are unique (spec §3) and which carry a
//! TTL index.

use std::sync::Arc;

use ollamax_core::{Backend, OllamaModelInfo, Project, Session, User};

use crate::entity::{Entity, UniqueKeyFn};
use crate::mongo::IndexSpec;

impl Entity for User {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn unique_keys() -> Vec<(&'static str, UniqueKeyFn<Self>)> {
        vec![
            (
                "username",
                Arc::new(|u: &User| Some(u.username.clone())) as UniqueKeyFn<Self>,
            ),
            (
                "key",
                Arc::new(|u: &User| Some(u.key.clone())) as UniqueKeyFn<Self>,
            ),
        ]
    }
}

pub fn user_indexes() -> Vec<IndexSpec> {
    vec![
        IndexSpec {
            name: "username_unique_index",
            keys: mongodb::bson::doc! { "username": 1 },
            unique: true,
            ttl_seconds: None,
        },
        IndexSpec {
            name: "key_unique_index",
            keys: mongodb::bson::doc! { "key": 1 },
            unique: true,
            ttl_seconds: None,
        },
    ]
}

impl Entity for Backend {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn unique_keys() -> Vec<(&'static str, UniqueKeyFn<Self>)> {
        vec![(
            "base_url",
            Arc::new(|b: &Backend| Some(b.base_url.clone())) as UniqueKeyFn<Self>,
        )]
    }
}

pub fn backend_indexes() -> Vec<IndexSpec> {
    vec![IndexSpec {
        name: "base_url_unique_index",
        keys: mongodb::bson::doc! { "base_url": 1 },
        unique: true,
        ttl_seconds: None,
    }]
}

impl Entity for OllamaModelInfo {
    fn id(&self) -> String {
        format!("{}|{}", self.name, self.digest)
    }

    fn unique_keys() -> Vec<(&'static str, UniqueKeyFn<Self>)> {
        vec![(
            "id_digest",
            Arc::new(|m: &OllamaModelInfo| Some(format!("{}|{}", m.name, m.digest)))
                as UniqueKeyFn<Self>,
        )]
    }
}

pub fn ollama_model_indexes() -> Vec<IndexSpec> {
    vec![IndexSpec {
        name: "id_digest_unique_index",
        keys: mongodb::bson::doc! { "name": 1, "digest": 1 },
        unique: true,
        ttl_seconds: None,
    }]
}

impl Entity for Session {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn expires_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        Some(self.expires_after)
    }
}

pub fn session_indexes() -> Vec<IndexSpec> {
    vec![IndexSpec {
        name: "expires_after_ttl_index",
        keys: mongodb::bson::doc! { "expires_after": 1 },
        unique: false,
        ttl_seconds: Some(0),
    }]
}

impl Entity for Project {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn unique_keys() -> Vec<(&'static str, UniqueKeyFn<Self>)> {
        vec![(
            "name",
            Arc::new(|p: &Project| Some(p.name.clone())) as UniqueKeyFn<Self>,
        )]
    }
}

pub fn project_indexes() -> Vec<IndexSpec> {
    vec![IndexSpec {
        name: "name_unique_index",
        keys: mongodb::bson::doc! { "name": 1 },
        unique: true,
        ttl_seconds: None,
    }]
}
