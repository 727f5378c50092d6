use std::{borrow::Cow, collections::BTreeMap};

use k8s_openapi::serde::Serialize;
use kube::{api::DynamicObject, Resource};
use thiserror::Error;

use crate::kubernetes::{to_dynamic, ObjectIdentity, StoreError};

use self::annotations::{has_annotation, IGNORE_ERRORS_ANNOTATION, WAIT_FOR_READY_ANNOTATION};

pub mod annotations;
pub mod crd;
pub mod labels;
pub mod release;
pub mod render;

#[derive(Debug, Error)]
pub enum ResourceGenerationError {
    #[error("Resource contains invalid data ({})!", .0)]
    InvalidData(Cow<'static, str>),
    #[error("Resource is missing required data ({})!", .0)]
    MissingData(Cow<'static, str>),
    #[error("Resource couldn't be serialized! Reason: {}", .0)]
    Serialization(#[source] StoreError),
}

/// How the applier writes an object, `Status` objects go through the status sub-resource
/// and never receive an owner reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectRole {
    Resource,
    Status,
}

#[derive(Debug, Clone)]
pub struct RenderedObject {
    pub object: DynamicObject,
    pub role: ObjectRole,
}

impl RenderedObject {
    pub fn new(object: DynamicObject) -> Self {
        Self {
            object,
            role: ObjectRole::Resource,
        }
    }

    pub fn from_resource<K>(resource: &K) -> Result<Self, ResourceGenerationError>
    where
        K: Resource<DynamicType = ()> + Serialize,
    {
        Ok(Self::new(
            to_dynamic(resource).map_err(ResourceGenerationError::Serialization)?,
        ))
    }

    pub fn status<K>(resource: &K) -> Result<Self, ResourceGenerationError>
    where
        K: Resource<DynamicType = ()> + Serialize,
    {
        Ok(Self {
            object: to_dynamic(resource).map_err(ResourceGenerationError::Serialization)?,
            role: ObjectRole::Status,
        })
    }

    pub fn with_annotations(mut self, annotations: BTreeMap<String, String>) -> Self {
        self.object
            .metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .extend(annotations);
        self
    }

    pub fn identity(&self) -> Result<ObjectIdentity, StoreError> {
        ObjectIdentity::from_object(&self.object)
    }

    pub fn ignores_errors(&self) -> bool {
        has_annotation(&self.object.metadata.annotations, IGNORE_ERRORS_ANNOTATION)
    }

    pub fn waits_for_ready(&self) -> bool {
        has_annotation(&self.object.metadata.annotations, WAIT_FOR_READY_ANNOTATION)
    }
}
