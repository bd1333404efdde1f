//! The filter state machine.
//!
//! ```text
//!   select_field ─┐                        ┌─► field_distribution ─┐
//!  update_filters ─┼─► optimistic publish ─┼─► filtered_data ──────┼─► join ─► commit + publish
//!  update_columns ─┘   (is_loading = true) └─► field_metadata ─────┘
//! ```
//!
//! Each operation publishes once when it starts and once when its fetches have
//! all resolved. Operations carry a sequence number per kind; a completion that
//! is no longer the latest of its kind is dropped instead of committed.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::future::Future;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use futures::future::try_join_all;

use crate::backend::FilterBackend;
use crate::config::ServiceConfig;
use crate::data::distribution::{sort_distribution, MemberSort};
use crate::data::filter::{Filter, FilterSet};
use crate::data::model::{Datum, Distribution, Field, FieldMetadataMap};
use crate::error::{FilterError, Result};
use crate::state::{FieldState, FilterServiceState};

// ---------------------------------------------------------------------------
// Construction input
// ---------------------------------------------------------------------------

/// Initial snapshot provided by the embedding page.
#[derive(Debug, Clone, Default)]
pub struct FilterServiceAttrs {
    pub fields: Vec<Field>,
    pub data: Vec<Datum>,
    pub columns: Vec<Field>,
    pub field_metadata_map: FieldMetadataMap,
}

/// How an operation's results were handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
    Applied,
    /// A newer operation of the same kind was issued; results were dropped.
    Superseded,
}

// ---------------------------------------------------------------------------
// Change listeners
// ---------------------------------------------------------------------------

type Listener = Rc<dyn Fn()>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(u64, Listener)>,
}

/// Handle returned by [`FilterService::add_listener`].
pub struct Subscription {
    id: u64,
    listeners: Weak<RefCell<Listeners>>,
}

impl Subscription {
    pub fn remove(self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.borrow_mut().entries.retain(|(id, _)| *id != self.id);
        }
    }
}

// ---------------------------------------------------------------------------
// Sequence numbers
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Sequence(Cell<u64>);

impl Sequence {
    fn issue(&self) -> u64 {
        let next = self.0.get() + 1;
        self.0.set(next);
        next
    }

    fn latest(&self) -> u64 {
        self.0.get()
    }

    fn is_latest(&self, seq: u64) -> bool {
        self.0.get() == seq
    }
}

/// Counts one operation as in flight until dropped, so an operation whose
/// future is abandoned still stops counting toward `is_loading`.
struct InFlight<'a>(&'a Cell<usize>);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a Cell<usize>) -> Self {
        counter.set(counter.get() + 1);
        InFlight(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

#[derive(Default)]
struct Sequences {
    field: Sequence,
    filters: Sequence,
    columns: Sequence,
}

// ---------------------------------------------------------------------------
// FilterService
// ---------------------------------------------------------------------------

/// Owns one filter widget's state and drives its fetches.
///
/// Single-threaded: operations take `&self` and may be in flight together on
/// one task, but the service itself is neither `Send` nor `Sync`.
pub struct FilterService<B> {
    backend: B,
    config: ServiceConfig,
    state: RefCell<Arc<FilterServiceState>>,
    listeners: Rc<RefCell<Listeners>>,
    sequences: Sequences,
    in_flight: Cell<usize>,
    /// Filters each cached distribution was computed against.
    distribution_basis: RefCell<BTreeMap<String, Vec<Arc<Filter>>>>,
}

impl<B: FilterBackend> FilterService<B> {
    pub fn new(backend: B, attrs: FilterServiceAttrs, config: ServiceConfig) -> Self {
        let state = FilterServiceState::new(
            &attrs.fields,
            attrs.data,
            attrs.columns,
            attrs.field_metadata_map,
        );
        FilterService {
            backend,
            config,
            state: RefCell::new(Arc::new(state)),
            listeners: Rc::new(RefCell::new(Listeners::default())),
            sequences: Sequences::default(),
            in_flight: Cell::new(0),
            distribution_basis: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The current snapshot.
    pub fn state(&self) -> Arc<FilterServiceState> {
        self.state.borrow().clone()
    }

    /// Register a change listener. Listeners get no payload; they read
    /// [`FilterService::state`].
    pub fn add_listener(&self, listener: impl Fn() + 'static) -> Subscription {
        let mut listeners = self.listeners.borrow_mut();
        listeners.next_id += 1;
        let id = listeners.next_id;
        listeners.entries.push((id, Rc::new(listener)));
        Subscription {
            id,
            listeners: Rc::downgrade(&self.listeners),
        }
    }

    // -- operations --

    /// Open `field`'s detail panel and fetch its distribution.
    ///
    /// Results are dropped if another field was selected, or the filters
    /// changed, before the fetch resolved.
    pub async fn select_field(&self, field: &Field) -> Result<Commit> {
        let seq = self.sequences.field.issue();
        let filters_seq = self.sequences.filters.latest();
        log::debug!("selectField {} (#{seq})", field.term);

        let guard = self.begin(|s| s.selected_field = Some(field.clone()));
        let filters = self.state().filters.clone();

        let result = self
            .fetch(
                "getFieldDistribution",
                self.backend.field_distribution(field, &filters),
            )
            .await;

        let current =
            self.sequences.field.is_latest(seq) && self.sequences.filters.is_latest(filters_seq);
        self.finish(guard, "selectField", current, result, |s, distribution| {
            self.store_distribution(s, &field.term, distribution, &filters);
        })
    }

    /// Look the field up by term, then [`select_field`](Self::select_field).
    pub async fn select_field_by_term(&self, term: &str) -> Result<Commit> {
        let field = self
            .state()
            .field(term)
            .cloned()
            .ok_or_else(|| FilterError::UnknownField {
                term: term.to_string(),
            })?;
        self.select_field(&field).await
    }

    /// Replace the filter list and recompute everything that depends on it.
    ///
    /// The new filters are published at once; filtered data, the selected
    /// filter's selection and the selected field's distribution are fetched
    /// together and committed in a single publish.
    pub async fn update_filters(&self, filters: Vec<Arc<Filter>>) -> Result<Commit> {
        let seq = self.sequences.filters.issue();
        let filters = FilterSet::from_filters(filters).into_vec();
        log::debug!("updateFilters with {} filter(s) (#{seq})", filters.len());

        let guard = self.begin(|s| s.filters = Arc::new(filters.clone()));
        let selected = self.state().selected_field.clone();
        let selected_filter = selected
            .as_ref()
            .and_then(|field| filters.iter().find(|f| f.field() == field.term).cloned());
        let refetch = selected
            .as_ref()
            .filter(|field| self.distribution_is_stale(&field.term, &filters));

        let filtered = self.fetch("getFilteredData", self.backend.filtered_data(&filters));
        let selection = async {
            match &selected_filter {
                Some(filter) => self
                    .fetch(
                        "getFilteredData",
                        self.backend.filtered_data(std::slice::from_ref(filter)),
                    )
                    .await
                    .map(Some),
                None => Ok(None),
            }
        };
        let distribution = async {
            match refetch {
                Some(field) => self
                    .fetch(
                        "getFieldDistribution",
                        self.backend.field_distribution(field, &filters),
                    )
                    .await
                    .map(Some),
                None => Ok(None),
            }
        };
        let result = tokio::try_join!(filtered, selection, distribution);

        let current = self.sequences.filters.is_latest(seq);
        self.finish(
            guard,
            "updateFilters",
            current,
            result,
            |s, (filtered_data, selection, distribution)| {
                s.filtered_data = Arc::new(filtered_data);
                if let (Some(filter), Some(selection)) = (&selected_filter, selection) {
                    let selection = Arc::new(selection);
                    s.filters = Arc::new(
                        s.filters
                            .iter()
                            .map(|f| {
                                if Arc::ptr_eq(f, filter) {
                                    Arc::new(f.with_selection(selection.clone()))
                                } else {
                                    f.clone()
                                }
                            })
                            .collect(),
                    );
                }
                match (selected.as_ref(), refetch, distribution) {
                    (_, Some(field), Some(distribution)) => {
                        self.store_distribution(s, &field.term, distribution, &filters);
                    }
                    // Cached counts still hold; the grouping by selected values may not.
                    (Some(field), _, _) => resort_distribution(s, &field.term),
                    _ => {}
                }
            },
        )
    }

    /// Show `fields` as result columns, fetching metadata for any field whose
    /// metadata is not loaded yet.
    pub async fn update_columns(&self, fields: Vec<Field>) -> Result<Commit> {
        let seq = self.sequences.columns.issue();
        log::debug!("updateColumns with {} column(s) (#{seq})", fields.len());

        let guard = self.begin(|_| {});
        let loaded = self.state().field_metadata_map.clone();
        let fetches = fields
            .iter()
            .filter(|field| !loaded.contains_key(&field.term))
            .map(|field| async move {
                self.fetch("getFieldMetadata", self.backend.field_metadata(field))
                    .await
                    .map(|metadata| (field.term.clone(), metadata))
            });
        let result = try_join_all(fetches).await;

        let current = self.sequences.columns.is_latest(seq);
        self.finish(guard, "updateColumns", current, result, |s, fetched| {
            if !fetched.is_empty() {
                let mut map = (*s.field_metadata_map).clone();
                map.extend(fetched.into_iter().map(|(term, m)| (term, Arc::new(m))));
                s.field_metadata_map = Arc::new(map);
            }
            s.columns = Arc::new(fields);
        })
    }

    /// Replace the hand-excluded data. No fetch is involved.
    pub fn update_ignored_data(&self, data: Vec<Datum>) {
        self.publish(|s| s.ignored_data = Arc::new(data));
    }

    /// Record revived filters that refer to fields no longer available.
    pub fn set_invalid_filters(&self, filters: Vec<Filter>) {
        self.publish(|s| s.invalid_filters = Arc::new(filters));
    }

    /// Change how a membership field lists its values; reorders its cached
    /// distribution to match.
    pub fn set_member_sort(&self, term: &str, sort: MemberSort) {
        self.publish(|s| {
            let mut states = (*s.field_states).clone();
            states.entry(term.to_string()).or_default().sort = sort;
            s.field_states = Arc::new(states);
            resort_distribution(s, term);
        });
    }

    pub fn set_member_search(&self, term: &str, search_term: impl Into<String>) {
        let search_term = search_term.into();
        self.publish(|s| {
            let mut states = (*s.field_states).clone();
            let entry: &mut FieldState = states.entry(term.to_string()).or_default();
            entry.search_term = search_term;
            s.field_states = Arc::new(states);
        });
    }

    /// `field`'s distribution under the current filters: the cached one when
    /// it is still current, otherwise fetched without touching the snapshot.
    pub async fn field_distribution(&self, field: &Field) -> Result<Arc<Distribution>> {
        let state = self.state();
        if let Some(cached) = state.distribution(&field.term) {
            if !self.distribution_is_stale(&field.term, &state.filters) {
                return Ok(cached.clone());
            }
        }
        let distribution = self
            .fetch(
                "getFieldDistribution",
                self.backend.field_distribution(field, &state.filters),
            )
            .await?;
        Ok(Arc::new(distribution))
    }

    // -- internals --

    async fn fetch<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let after = self.config.fetch_timeout();
        match tokio::time::timeout(after, fut).await {
            Ok(result) => result,
            Err(_) => Err(FilterError::Timeout { operation, after }),
        }
    }

    /// Whether the cached distribution of `term` was computed against other
    /// filters than the ones in `filters`. The field's own filter does not
    /// enter its distribution.
    fn distribution_is_stale(&self, term: &str, filters: &[Arc<Filter>]) -> bool {
        let basis = self.distribution_basis.borrow();
        match basis.get(term) {
            Some(previous) => !same_other_filters(term, previous, filters),
            None => true,
        }
    }

    fn store_distribution(
        &self,
        s: &mut FilterServiceState,
        term: &str,
        distribution: Distribution,
        basis: &[Arc<Filter>],
    ) {
        let sorted = sort_distribution(
            &distribution,
            s.field_state(term).sort,
            s.filter_for(term).map(Arc::as_ref),
        );
        insert_distribution(s, term, sorted);
        self.distribution_basis
            .borrow_mut()
            .insert(term.to_string(), basis.to_vec());
    }

    /// Count an operation in and publish its optimistic state.
    fn begin(&self, update: impl FnOnce(&mut FilterServiceState)) -> InFlight<'_> {
        let guard = InFlight::enter(&self.in_flight);
        self.publish(update);
        guard
    }

    /// Count an operation out and commit, record or drop its result.
    fn finish<T>(
        &self,
        guard: InFlight<'_>,
        operation: &'static str,
        current: bool,
        result: Result<T>,
        commit: impl FnOnce(&mut FilterServiceState, T),
    ) -> Result<Commit> {
        drop(guard);
        match (current, result) {
            (true, Ok(value)) => {
                log::debug!("{operation} committed");
                self.publish(|s| {
                    commit(s, value);
                    s.error = None;
                });
                Ok(Commit::Applied)
            }
            (true, Err(err)) => {
                log::warn!("{operation} failed: {err}");
                let message = err.to_string();
                self.publish(|s| s.error = Some(message));
                Err(err)
            }
            (false, result) => {
                log::warn!("{operation} result superseded by a newer call; discarding");
                if self.state().is_loading != self.is_loading() {
                    self.publish(|_| {});
                }
                result.map(|_| Commit::Superseded)
            }
        }
    }

    fn is_loading(&self) -> bool {
        self.in_flight.get() > 0
    }

    /// Build the next snapshot from the current one and notify listeners.
    fn publish(&self, update: impl FnOnce(&mut FilterServiceState)) {
        let next = {
            let current = self.state.borrow();
            let mut next = FilterServiceState::clone(&current);
            update(&mut next);
            next.is_loading = self.is_loading();
            Arc::new(next)
        };
        *self.state.borrow_mut() = next;
        self.emit_change();
    }

    fn emit_change(&self) {
        let listeners: Vec<Listener> = self
            .listeners
            .borrow()
            .entries
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener();
        }
    }
}

/// Reorder `term`'s cached distribution for its sort and current filter.
fn resort_distribution(s: &mut FilterServiceState, term: &str) {
    if let Some(distribution) = s.distribution(term).cloned() {
        let sorted = sort_distribution(
            &distribution,
            s.field_state(term).sort,
            s.filter_for(term).map(Arc::as_ref),
        );
        insert_distribution(s, term, sorted);
    }
}

fn insert_distribution(s: &mut FilterServiceState, term: &str, distribution: Distribution) {
    let mut map = (*s.distribution_map).clone();
    map.insert(term.to_string(), Arc::new(distribution));
    s.distribution_map = Arc::new(map);
}

/// Whether `a` and `b` constrain every field except `term` identically.
fn same_other_filters(term: &str, a: &[Arc<Filter>], b: &[Arc<Filter>]) -> bool {
    let others = |filters: &[Arc<Filter>]| {
        let mut others: Vec<Filter> = filters
            .iter()
            .filter(|f| f.field() != term)
            .map(|f| f.stripped())
            .collect();
        others.sort_by(|x, y| x.field().cmp(y.field()));
        others
    };
    others(a) == others(b)
}
