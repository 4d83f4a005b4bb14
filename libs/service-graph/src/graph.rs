//! The graph, its build transactions and typed handles.

use std::any::{TypeId, type_name};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::activation::ActivationCell;
use crate::error::{ActivationError, GraphError};
use crate::name::ServiceName;
use crate::service::{ActivationMode, AnyValue, ErasedService, Service, ValueService};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    Staged,
    Installed,
    Removed,
}

pub(crate) struct Node {
    name: ServiceName,
    mode: ActivationMode,
    /// Started before this node starts.
    required: Vec<Arc<Node>>,
    /// Every edge, required or not; drives teardown order.
    edges: Vec<ServiceName>,
    service: Box<dyn ErasedService>,
    value_type: TypeId,
    type_name: &'static str,
    state: Mutex<NodeState>,
    cell: ActivationCell,
}

impl Node {
    fn state(&self) -> NodeState {
        *self.state.lock()
    }

    fn set_state(&self, state: NodeState) {
        *self.state.lock() = state;
    }

    /// Starts required dependencies first, then this node. Single-flight per
    /// node.
    fn activate(&self) -> BoxFuture<'_, Result<AnyValue, ActivationError>> {
        Box::pin(async move {
            match self.state() {
                NodeState::Installed => {}
                NodeState::Staged => return Err(ActivationError::NotInstalled(self.name.clone())),
                NodeState::Removed => return Err(ActivationError::Removed(self.name.clone())),
            }

            self.cell
                .get_or_start(|| async move {
                    for dependency in &self.required {
                        dependency.activate().await.map_err(|e| ActivationError::Dependency {
                            dependency: dependency.name.clone(),
                            source: Box::new(e),
                        })?;
                    }
                    debug!(service = %self.name, "Activating service");
                    let value = self.service.start_erased().await.inspect_err(|e| {
                        warn!(service = %self.name, error = %e, "Service failed to activate");
                    })?;
                    debug!(service = %self.name, "Service active");
                    Ok(value)
                })
                .await
        })
    }

    async fn deactivate(&self) -> bool {
        if self.cell.reset().await {
            self.service.stop_erased().await;
            debug!(service = %self.name, "Service stopped");
            true
        } else {
            false
        }
    }
}

/// Typed reference to a node.
///
/// Obtained from [`ServiceBuilder::install`] or [`Transaction::lookup`].
pub struct ServiceHandle<T: ?Sized> {
    node: Arc<Node>,
    _marker: PhantomData<fn() -> Arc<T>>,
}

impl<T: ?Sized> Clone for ServiceHandle<T> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
            _marker: PhantomData,
        }
    }
}

impl<T: ?Sized> fmt::Debug for ServiceHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("name", &self.node.name)
            .field("mode", &self.node.mode)
            .finish_non_exhaustive()
    }
}

impl<T: ?Sized + Send + Sync + 'static> ServiceHandle<T> {
    fn new(node: Arc<Node>) -> Self {
        Self {
            node,
            _marker: PhantomData,
        }
    }

    #[must_use]
    pub fn name(&self) -> &ServiceName {
        &self.node.name
    }

    #[must_use]
    pub fn mode(&self) -> ActivationMode {
        self.node.mode
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.node.cell.is_active()
    }

    /// Returns the node's capability, activating it (and its required
    /// dependencies) on first use.
    ///
    /// Concurrent first callers wait on a single activation and all observe
    /// the same value.
    ///
    /// # Errors
    ///
    /// Returns an [`ActivationError`] if the node is not installed, was
    /// removed, or failed to start.
    pub async fn get(&self) -> Result<Arc<T>, ActivationError> {
        let value = self.node.activate().await?;
        value
            .downcast_ref::<Arc<T>>()
            .map(Arc::clone)
            .ok_or_else(|| ActivationError::TypeMismatch(self.node.name.clone()))
    }
}

#[derive(Default)]
struct GraphState {
    nodes: HashMap<ServiceName, Arc<Node>>,
    /// dependency name -> names of nodes with an edge to it
    dependents: HashMap<ServiceName, BTreeSet<ServiceName>>,
}

impl GraphState {
    /// Dependents-before-dependencies order of `names` (post-order over the
    /// reverse edges, restricted to the set).
    fn teardown_order(&self, names: &HashSet<ServiceName>) -> Vec<ServiceName> {
        fn visit(
            state: &GraphState,
            name: &ServiceName,
            names: &HashSet<ServiceName>,
            seen: &mut HashSet<ServiceName>,
            out: &mut Vec<ServiceName>,
        ) {
            if !seen.insert(name.clone()) {
                return;
            }
            if let Some(dependents) = state.dependents.get(name) {
                for dependent in dependents.iter().filter(|d| names.contains(*d)) {
                    visit(state, dependent, names, seen, out);
                }
            }
            out.push(name.clone());
        }

        let mut sorted: Vec<&ServiceName> = names.iter().collect();
        sorted.sort();

        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(names.len());
        for name in sorted {
            visit(self, name, names, &mut seen, &mut out);
        }
        out
    }

    fn unlink(&mut self, node: &Node) {
        for dependency in &node.edges {
            if let Some(dependents) = self.dependents.get_mut(dependency) {
                dependents.remove(&node.name);
                if dependents.is_empty() {
                    self.dependents.remove(dependency);
                }
            }
        }
    }

    fn has_dependents(&self, name: &ServiceName) -> bool {
        self.dependents.get(name).is_some_and(|d| !d.is_empty())
    }
}

/// Registry of published nodes.
///
/// Nodes enter through a [`Transaction`] and leave through
/// [`ServiceGraph::remove_all`].
#[derive(Default)]
pub struct ServiceGraph {
    state: RwLock<GraphState>,
}

impl ServiceGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a build transaction. Nothing registered through it is visible
    /// until [`Transaction::commit`] succeeds.
    #[must_use]
    pub fn transaction(&self) -> Transaction<'_> {
        Transaction {
            graph: self,
            staged: Vec::new(),
            index: HashMap::new(),
            finished: false,
        }
    }

    /// Publishes an already built value under `name` as an on-demand node.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Duplicate`] if the name is taken.
    pub async fn publish_value<T>(
        &self,
        name: ServiceName,
        value: Arc<T>,
    ) -> Result<ServiceHandle<T>, GraphError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let mut tx = self.transaction();
        let handle = tx.add_service(name, ValueService::new(value)).install()?;
        tx.commit().await?;
        Ok(handle)
    }

    /// Typed handle to a published node.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::NotFound`] or [`GraphError::TypeMismatch`].
    pub fn lookup<T>(&self, name: &ServiceName) -> Result<ServiceHandle<T>, GraphError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let node = self
            .state
            .read()
            .nodes
            .get(name)
            .cloned()
            .ok_or_else(|| GraphError::NotFound(name.clone()))?;
        typed_handle(node)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().nodes.is_empty()
    }

    #[must_use]
    pub fn contains(&self, name: &ServiceName) -> bool {
        self.state.read().nodes.contains_key(name)
    }

    /// Published names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<ServiceName> {
        let mut names: Vec<ServiceName> = self.state.read().nodes.keys().cloned().collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn is_active(&self, name: &ServiceName) -> bool {
        self.state
            .read()
            .nodes
            .get(name)
            .is_some_and(|n| n.cell.is_active())
    }

    /// Names of published nodes with an edge to `name`, sorted.
    #[must_use]
    pub fn dependents_of(&self, name: &ServiceName) -> Vec<ServiceName> {
        self.state
            .read()
            .dependents
            .get(name)
            .map_or_else(Vec::new, |d| d.iter().cloned().collect())
    }

    /// Stops and removes the named nodes, dependents before dependencies.
    ///
    /// Names that are not registered are ignored, and nodes that never
    /// started are removed without a stop. On-demand dependencies outside
    /// the set that are left without any dependent are stopped as well, so a
    /// shared resource lives exactly as long as one of its users.
    ///
    /// Returns the removed names in teardown order.
    pub async fn remove_all(&self, names: &[ServiceName]) -> Vec<ServiceName> {
        let (removed, released) = {
            let mut state = self.state.write();
            let targets: HashSet<ServiceName> = names
                .iter()
                .filter(|n| state.nodes.contains_key(*n))
                .cloned()
                .collect();
            let order = state.teardown_order(&targets);

            let mut removed = Vec::with_capacity(order.len());
            let mut released = Vec::new();
            for name in &order {
                if let Some(node) = state.nodes.remove(name) {
                    node.set_state(NodeState::Removed);
                    state.unlink(&node);
                    state.dependents.remove(name);
                    released.extend(node.edges.iter().filter(|d| !targets.contains(*d)).cloned());
                    removed.push(node);
                }
            }
            (removed, released)
        };

        for node in &removed {
            node.deactivate().await;
        }
        self.release_idle(released).await;

        let removed: Vec<ServiceName> = removed.iter().map(|n| n.name.clone()).collect();
        debug!(count = removed.len(), "Removed services");
        removed
    }

    /// Stops on-demand nodes that lost their last dependent, walking down
    /// their own dependencies.
    async fn release_idle(&self, mut pending: Vec<ServiceName>) {
        let mut visited = HashSet::new();
        while let Some(name) = pending.pop() {
            if !visited.insert(name.clone()) {
                continue;
            }
            let node = {
                let state = self.state.read();
                match state.nodes.get(&name) {
                    Some(node)
                        if node.mode == ActivationMode::OnDemand
                            && !state.has_dependents(&name) =>
                    {
                        Some(Arc::clone(node))
                    }
                    _ => None,
                }
            };
            if let Some(node) = node
                && node.deactivate().await
            {
                pending.extend(node.edges.iter().cloned());
            }
        }
    }
}

fn typed_handle<T>(node: Arc<Node>) -> Result<ServiceHandle<T>, GraphError>
where
    T: ?Sized + Send + Sync + 'static,
{
    if node.value_type != TypeId::of::<T>() {
        return Err(GraphError::TypeMismatch {
            name: node.name.clone(),
            expected: type_name::<T>(),
            actual: node.type_name,
        });
    }
    Ok(ServiceHandle::new(node))
}

/// A build transaction.
///
/// Nodes are staged privately. [`Transaction::commit`] publishes them all at
/// once; [`Transaction::rollback`] or dropping the transaction discards them
/// all. Callers never observe part of a transaction.
pub struct Transaction<'g> {
    graph: &'g ServiceGraph,
    staged: Vec<Arc<Node>>,
    index: HashMap<ServiceName, Arc<Node>>,
    finished: bool,
}

impl<'g> Transaction<'g> {
    /// Starts declaring a node.
    pub fn add_service<S: Service>(&mut self, name: ServiceName, service: S) -> ServiceBuilder<'_, 'g, S> {
        ServiceBuilder {
            tx: self,
            name,
            service,
            mode: ActivationMode::OnDemand,
            required: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Typed handle to a node staged in this transaction or already
    /// published.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::NotFound`] or [`GraphError::TypeMismatch`].
    pub fn lookup<T>(&self, name: &ServiceName) -> Result<ServiceHandle<T>, GraphError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        match self.index.get(name) {
            Some(node) => typed_handle(Arc::clone(node)),
            None => self.graph.lookup(name),
        }
    }

    /// Names staged so far, in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<ServiceName> {
        self.staged.iter().map(|n| n.name.clone()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.staged.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    fn is_registered(&self, node: &Arc<Node>) -> bool {
        match node.state() {
            NodeState::Staged => self
                .index
                .get(&node.name)
                .is_some_and(|staged| Arc::ptr_eq(staged, node)),
            NodeState::Installed => self
                .graph
                .state
                .read()
                .nodes
                .get(&node.name)
                .is_some_and(|published| Arc::ptr_eq(published, node)),
            NodeState::Removed => false,
        }
    }

    /// Publishes every staged node, then starts the `Active` ones.
    ///
    /// Returns the published names in registration order.
    ///
    /// # Errors
    ///
    /// - [`GraphError::Duplicate`] if a name was published concurrently
    /// - [`GraphError::Activation`] if an `Active` node failed to start; the
    ///   whole transaction is removed again before returning
    pub async fn commit(mut self) -> Result<Vec<ServiceName>, GraphError> {
        let names = self.names();
        {
            let mut state = self.graph.state.write();
            if let Some(taken) = names.iter().find(|n| state.nodes.contains_key(*n)) {
                return Err(GraphError::Duplicate(taken.clone()));
            }
            for node in &self.staged {
                state.nodes.insert(node.name.clone(), Arc::clone(node));
                for dependency in &node.edges {
                    state
                        .dependents
                        .entry(dependency.clone())
                        .or_default()
                        .insert(node.name.clone());
                }
                node.set_state(NodeState::Installed);
            }
        }
        self.finished = true;

        let eager: Vec<Arc<Node>> = self
            .staged
            .iter()
            .filter(|n| n.mode == ActivationMode::Active)
            .cloned()
            .collect();
        for node in eager {
            if let Err(source) = node.activate().await {
                warn!(service = %node.name, error = %source, "Eager activation failed, removing transaction");
                self.graph.remove_all(&names).await;
                return Err(GraphError::Activation {
                    name: node.name.clone(),
                    source,
                });
            }
        }

        info!(count = names.len(), "Committed service transaction");
        Ok(names)
    }

    /// Discards every staged node.
    pub fn rollback(mut self) {
        self.discard();
    }

    fn discard(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        if self.staged.is_empty() {
            return;
        }
        warn!(count = self.staged.len(), "Rolling back service transaction");
        for node in self.staged.drain(..) {
            node.set_state(NodeState::Removed);
        }
        self.index.clear();
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        self.discard();
    }
}

/// Declares one node: dependencies, activation mode, then [`install`](Self::install).
pub struct ServiceBuilder<'t, 'g, S: Service> {
    tx: &'t mut Transaction<'g>,
    name: ServiceName,
    service: S,
    mode: ActivationMode,
    required: Vec<Arc<Node>>,
    edges: Vec<Arc<Node>>,
}

impl<S: Service> ServiceBuilder<'_, '_, S> {
    /// Adds an edge to `dependency`, which is started before this node.
    #[must_use]
    pub fn depends_on<T: ?Sized>(mut self, dependency: &ServiceHandle<T>) -> Self {
        self.required.push(Arc::clone(&dependency.node));
        self.edges.push(Arc::clone(&dependency.node));
        self
    }

    /// Adds an edge to `dependency` without starting it; the service
    /// resolves it on first use.
    #[must_use]
    pub fn references<T: ?Sized>(mut self, dependency: &ServiceHandle<T>) -> Self {
        self.edges.push(Arc::clone(&dependency.node));
        self
    }

    #[must_use]
    pub fn initial_mode(mut self, mode: ActivationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Registers the node in the transaction.
    ///
    /// # Errors
    ///
    /// - [`GraphError::Duplicate`] if the name is taken
    /// - [`GraphError::MissingDependency`] if an edge points at a node that is
    ///   neither published nor staged in this transaction
    pub fn install(self) -> Result<ServiceHandle<S::Value>, GraphError> {
        let Self {
            tx,
            name,
            service,
            mode,
            required,
            edges,
        } = self;

        if tx.index.contains_key(&name) || tx.graph.contains(&name) {
            return Err(GraphError::Duplicate(name));
        }
        if let Some(missing) = edges.iter().find(|d| !tx.is_registered(d)) {
            return Err(GraphError::MissingDependency {
                service: name,
                dependency: missing.name.clone(),
            });
        }

        let mut edge_names: Vec<ServiceName> = edges.iter().map(|d| d.name.clone()).collect();
        edge_names.sort();
        edge_names.dedup();

        let node = Arc::new(Node {
            name: name.clone(),
            mode,
            required,
            edges: edge_names,
            service: Box::new(service),
            value_type: TypeId::of::<S::Value>(),
            type_name: type_name::<S::Value>(),
            state: Mutex::new(NodeState::Staged),
            cell: ActivationCell::new(),
        });
        debug!(service = %name, ?mode, dependencies = node.edges.len(), "Registered service");

        tx.index.insert(name, Arc::clone(&node));
        tx.staged.push(Arc::clone(&node));
        Ok(ServiceHandle::new(node))
    }
}
