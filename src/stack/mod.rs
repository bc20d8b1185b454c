//! Stacks: the unit of deployment.
//!
//! A [`Stack`] collects resources under unique logical ids, records the
//! ordering constraints and permission grants between them and synthesizes
//! the whole thing into a [`Template`]. Resources are created and torn down
//! together by the deployment engine; nothing here talks to AWS.
//!
//! Constructs (see [`crate::constructs`]) never hand out `&mut Resource`
//! across calls. They keep logical ids and go back through the stack when a
//! later step needs to extend a resource, the same way a container's
//! environment is filled in after the resources it points at exist.

pub mod dependencies;
pub mod logical_id;

pub use dependencies::{DependencyGraph, DependencyType, ResourceDependency, ResourceNode};
pub use logical_id::make_unique_id;

use indexmap::IndexMap;
use serde_json::Value as Json;
use tracing::{debug, info};

use crate::assembly;
use crate::assets::ImageAssetSource;
use crate::constructs::iam::Grant;
use crate::error::{Error, Result};
use crate::template::{Output, Resource, Template, Value};

/// Account and region a stack is deployed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    /// 12-digit account id
    pub account: String,
    /// Region name, e.g. `us-east-1`
    pub region: String,
}

impl Environment {
    /// Create and validate an environment.
    pub fn new(account: impl Into<String>, region: impl Into<String>) -> Result<Self> {
        let env = Self {
            account: account.into(),
            region: region.into(),
        };
        if env.account.len() != 12 || !env.account.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::invalid_config(
                "stack.account",
                format!("'{}' is not a 12-digit account id", env.account),
            ));
        }
        if env.region.is_empty()
            || !env
                .region
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(Error::invalid_config(
                "stack.region",
                format!("'{}' is not a region name", env.region),
            ));
        }
        Ok(env)
    }

    /// `aws://account/region`, as used in the assembly manifest.
    pub fn descriptor(&self) -> String {
        format!("aws://{}/{}", self.account, self.region)
    }
}

/// Anything declared into a stack that can be depended upon.
pub trait Construct {
    /// Construct path relative to the stack.
    fn path(&self) -> &[String];

    /// Logical id of the construct's primary resource.
    fn logical_id(&self) -> &str;
}

/// A set of resources deployed and torn down as one unit.
#[derive(Debug, Clone)]
pub struct Stack {
    name: String,
    env: Environment,
    description: Option<String>,
    resources: IndexMap<String, Resource>,
    paths: IndexMap<String, Vec<String>>,
    construct_dependencies: Vec<(String, Vec<String>)>,
    grants: Vec<Grant>,
    assets: Vec<ImageAssetSource>,
    outputs: IndexMap<String, Output>,
}

impl Stack {
    /// Create an empty stack.
    pub fn new(name: impl Into<String>, env: Environment) -> Result<Self> {
        let name = name.into();
        let valid = name.len() <= 128
            && name.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(Error::invalid_config(
                "stack.name",
                format!("'{}' is not a valid stack name", name),
            ));
        }

        Ok(Self {
            name,
            env,
            description: None,
            resources: IndexMap::new(),
            paths: IndexMap::new(),
            construct_dependencies: Vec::new(),
            grants: Vec::new(),
            assets: Vec::new(),
            outputs: IndexMap::new(),
        })
    }

    /// Stack name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Deployment environment
    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Set the template description.
    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = Some(description.into());
    }

    /// Logical id a construct path would receive.
    pub fn logical_id_for<S: AsRef<str>>(&self, path: &[S]) -> Result<String> {
        make_unique_id(path)
    }

    /// Declare a resource at a construct path and return its logical id.
    pub fn add_resource<S: AsRef<str>>(&mut self, path: &[S], resource: Resource) -> Result<String> {
        let logical_id = make_unique_id(path)?;
        if self.resources.contains_key(&logical_id) || self.outputs.contains_key(&logical_id) {
            return Err(Error::DuplicateLogicalId(logical_id));
        }

        debug!(
            logical_id = %logical_id,
            resource_type = %resource.resource_type,
            "declared resource"
        );

        self.paths.insert(
            logical_id.clone(),
            path.iter().map(|s| s.as_ref().to_string()).collect(),
        );
        self.resources.insert(logical_id.clone(), resource);
        Ok(logical_id)
    }

    /// Returns true if a resource with this logical id exists.
    pub fn contains(&self, logical_id: &str) -> bool {
        self.resources.contains_key(logical_id)
    }

    /// Look up a resource.
    pub fn resource(&self, logical_id: &str) -> Option<&Resource> {
        self.resources.get(logical_id)
    }

    /// Look up a resource for modification.
    pub fn resource_mut(&mut self, logical_id: &str) -> Result<&mut Resource> {
        self.resources
            .get_mut(logical_id)
            .ok_or_else(|| Error::ResourceNotFound(logical_id.to_string()))
    }

    /// Append to an array property of an existing resource.
    pub fn push_property(&mut self, logical_id: &str, key: &str, value: Json) -> Result<()> {
        self.resource_mut(logical_id)?.push_property(key, value);
        Ok(())
    }

    /// Construct path a resource was declared at.
    pub fn path_of(&self, logical_id: &str) -> Option<&[String]> {
        self.paths.get(logical_id).map(Vec::as_slice)
    }

    /// Number of declared resources.
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    /// Make `dependent` wait for every resource under `dependency`.
    ///
    /// Resolved at synthesis time, so resources added under `dependency`
    /// later (a role's default policy, for instance) are covered too.
    pub fn add_dependency(&mut self, dependent: &dyn Construct, dependency: &dyn Construct) {
        self.add_dependency_on_path(dependent.logical_id(), dependency.path());
    }

    /// Make the resource `dependent` wait for every resource under the
    /// construct path `dependency`.
    pub fn add_dependency_on_path(&mut self, dependent: &str, dependency: &[String]) {
        let entry = (dependent.to_string(), dependency.to_vec());
        if !self.construct_dependencies.contains(&entry) {
            self.construct_dependencies.push(entry);
        }
    }

    /// Record a permission grant. Returns false if an identical grant exists.
    pub fn record_grant(&mut self, grant: Grant) -> bool {
        if self.grants.contains(&grant) {
            return false;
        }
        debug!(
            grantee = %grant.grantee,
            target = %grant.target,
            kind = ?grant.kind,
            "recorded grant"
        );
        self.grants.push(grant);
        true
    }

    /// All grants, in the order they were made.
    pub fn grants(&self) -> &[Grant] {
        &self.grants
    }

    /// Grants made to one principal.
    pub fn grants_for<'a>(&'a self, grantee: &'a str) -> impl Iterator<Item = &'a Grant> + 'a {
        self.grants.iter().filter(move |g| g.grantee == grantee)
    }

    /// Register a container image asset. Identical sources are kept once.
    pub fn add_asset(&mut self, source: ImageAssetSource) {
        if !self.assets.iter().any(|a| a.hash == source.hash) {
            self.assets.push(source);
        }
    }

    /// Registered container image assets.
    pub fn assets(&self) -> &[ImageAssetSource] {
        &self.assets
    }

    /// Add a template output.
    pub fn add_output(
        &mut self,
        id: &str,
        value: Value,
        description: Option<&str>,
    ) -> Result<()> {
        if self.outputs.contains_key(id) || self.resources.contains_key(id) {
            return Err(Error::DuplicateLogicalId(id.to_string()));
        }
        self.outputs.insert(
            id.to_string(),
            Output {
                value: value.to_json(),
                description: description.map(String::from),
                export: None,
            },
        );
        Ok(())
    }

    /// Resources with construct-level dependencies expanded into `DependsOn`.
    fn resolved_resources(&self) -> Result<IndexMap<String, Resource>> {
        let mut resources = self.resources.clone();

        for (dependent, prefix) in &self.construct_dependencies {
            let targets: Vec<&String> = self
                .paths
                .iter()
                .filter(|(id, path)| *id != dependent && path.starts_with(prefix))
                .map(|(id, _)| id)
                .collect();

            if targets.is_empty() {
                return Err(Error::ResourceNotFound(prefix.join("/")));
            }

            let resource = resources
                .get_mut(dependent)
                .ok_or_else(|| Error::ResourceNotFound(dependent.clone()))?;
            for target in targets {
                resource.add_dependency(target.clone());
            }
        }

        Ok(resources)
    }

    fn graph_of(&self, resources: &IndexMap<String, Resource>) -> Result<DependencyGraph> {
        let mut graph = DependencyGraph::new();
        for (id, resource) in resources {
            graph.add_node(ResourceNode::new(id.clone(), resource.resource_type.clone()));
        }

        let parameters = assembly::bootstrap_parameters();
        for (id, resource) in resources {
            for dep in &resource.depends_on {
                graph.add_dependency(ResourceDependency::new(
                    dep.clone(),
                    id.clone(),
                    DependencyType::Explicit,
                ))?;
            }
            for reference in resource.references() {
                if parameters.contains_key(&reference.target) {
                    continue;
                }
                graph.add_dependency(
                    ResourceDependency::new(
                        reference.target.clone(),
                        id.clone(),
                        DependencyType::Reference,
                    )
                    .with_attribute(reference.attribute.clone()),
                )?;
            }
        }

        Ok(graph)
    }

    /// Build the dependency graph of the fully resolved stack.
    pub fn dependency_graph(&self) -> Result<DependencyGraph> {
        let resources = self.resolved_resources()?;
        self.graph_of(&resources)
    }

    /// Creation order respecting every dependency.
    pub fn deploy_order(&self) -> Result<Vec<String>> {
        self.dependency_graph()?.deploy_order()
    }

    /// DOT rendering of the dependency graph.
    pub fn to_dot(&self) -> Result<String> {
        Ok(self.dependency_graph()?.to_dot())
    }

    /// Validate the stack and produce its template.
    pub fn synth(&self) -> Result<Template> {
        let resources = self.resolved_resources()?;
        let graph = self.graph_of(&resources)?;
        if graph.has_cycles() {
            return Err(Error::DependencyCycle(graph.describe_cycles()));
        }

        for (id, output) in &self.outputs {
            for reference in crate::template::collect_references(&output.value) {
                if !resources.contains_key(&reference.target) {
                    return Err(Error::dangling_reference(id.clone(), reference.target));
                }
            }
        }

        info!(
            stack = %self.name,
            resources = resources.len(),
            dependencies = graph.edge_count(),
            "synthesized stack"
        );

        Ok(Template {
            description: self.description.clone(),
            parameters: assembly::bootstrap_parameters(),
            resources,
            outputs: self.outputs.clone(),
            rules: assembly::bootstrap_rules(),
            ..Template::default()
        })
    }
}
