//! Time schedules.
//!
//! A [`Schedule`] is a finite, monotonically non-decreasing sequence of time
//! points, each annotated with what happens there: whether the point is
//! observed, whether it produces output, and whether the bridge weighting
//! function applies. The filter walks the schedule forward-only through a
//! [`ScheduleIter`]; time never rewinds within one invocation.
//!
//! Observation and output indices are derived during construction so that a
//! node always knows which observation it corrects against (or, for
//! unobserved nodes, which observation comes next) and which output column
//! it maps to.

use serde::{Deserialize, Serialize};

use crate::filter::FilterError;

/// One time point as supplied by the caller, before index derivation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimePoint {
    /// Simulation time of this point.
    pub time: f64,
    /// Does this point emit filter output?
    pub has_output: bool,
    /// Does the bridge weighting function apply at this point?
    pub has_bridge: bool,
    /// Is an observation available at this point?
    pub is_observed: bool,
}

impl TimePoint {
    /// Create a plain time point with no annotations.
    pub fn new(time: f64) -> Self {
        Self {
            time,
            has_output: false,
            has_bridge: false,
            is_observed: false,
        }
    }

    /// Mark the point as observed.
    pub fn observed(mut self) -> Self {
        self.is_observed = true;
        self
    }

    /// Mark the point as producing output.
    pub fn with_output(mut self) -> Self {
        self.has_output = true;
        self
    }

    /// Mark the point as bridge-capable.
    pub fn with_bridge(mut self) -> Self {
        self.has_bridge = true;
        self
    }
}

/// A schedule node: a time point plus derived observation/output indices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduleNode {
    /// Simulation time of this node.
    pub time: f64,
    /// Does this node emit filter output?
    pub has_output: bool,
    /// Does the bridge weighting function apply at this node?
    pub has_bridge: bool,
    /// Is an observation available at this node?
    pub is_observed: bool,
    /// Output column index for nodes with output.
    pub index_output: usize,
    /// Index of the observation at this node if observed, otherwise the
    /// index of the next observation.
    pub index_obs: usize,
}

/// Validated, forward-iterable time schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    nodes: Vec<ScheduleNode>,
    num_obs: usize,
    num_outputs: usize,
}

impl Schedule {
    /// Build a schedule from time points.
    ///
    /// Fails with [`FilterError::InvalidSchedule`] before any side effect if
    /// the point list is empty or times decrease anywhere.
    pub fn new(points: Vec<TimePoint>) -> Result<Self, FilterError> {
        if points.is_empty() {
            return Err(FilterError::InvalidSchedule {
                description: "schedule has no time points".to_string(),
            });
        }
        for (i, pair) in points.windows(2).enumerate() {
            if !(pair[1].time >= pair[0].time) {
                return Err(FilterError::InvalidSchedule {
                    description: format!(
                        "times non-monotonic at index {}: {} followed by {}",
                        i + 1,
                        pair[0].time,
                        pair[1].time
                    ),
                });
            }
        }

        let mut nodes = Vec::with_capacity(points.len());
        let mut num_obs = 0;
        let mut num_outputs = 0;
        for p in points {
            nodes.push(ScheduleNode {
                time: p.time,
                has_output: p.has_output,
                has_bridge: p.has_bridge,
                is_observed: p.is_observed,
                index_output: num_outputs,
                index_obs: num_obs,
            });
            if p.is_observed {
                num_obs += 1;
            }
            if p.has_output {
                num_outputs += 1;
            }
        }

        Ok(Self {
            nodes,
            num_obs,
            num_outputs,
        })
    }

    /// Regular schedule: every point has output and bridge enabled, and the
    /// points whose times appear in `obs_times` are observed.
    ///
    /// `obs_times` entries are matched exactly against `times`.
    pub fn regular(times: &[f64], obs_times: &[f64]) -> Result<Self, FilterError> {
        let points = times
            .iter()
            .map(|&t| {
                let mut p = TimePoint::new(t).with_output().with_bridge();
                if obs_times.iter().any(|&ot| ot == t) {
                    p = p.observed();
                }
                p
            })
            .collect();
        Self::new(points)
    }

    /// Number of nodes.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false for a validated schedule.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Total number of observed nodes.
    #[inline]
    pub fn num_obs(&self) -> usize {
        self.num_obs
    }

    /// Total number of output nodes.
    #[inline]
    pub fn num_outputs(&self) -> usize {
        self.num_outputs
    }

    /// Node at position `i`.
    #[inline]
    pub fn node(&self, i: usize) -> &ScheduleNode {
        &self.nodes[i]
    }

    /// Forward-only cursor positioned at the first node.
    pub fn iter(&self) -> ScheduleIter<'_> {
        ScheduleIter {
            schedule: self,
            pos: 0,
        }
    }
}

/// Forward-only cursor over a schedule.
///
/// Unlike a standard iterator, the cursor always points at a valid node and
/// exposes whether that node is the last one, which is what the filter's
/// do-while loop needs.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleIter<'a> {
    schedule: &'a Schedule,
    pos: usize,
}

impl<'a> ScheduleIter<'a> {
    /// The node the cursor currently points at.
    #[inline]
    pub fn current(&self) -> &'a ScheduleNode {
        self.schedule.node(self.pos)
    }

    /// Position of the cursor within the schedule.
    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Is the cursor at the final node?
    #[inline]
    pub fn at_last(&self) -> bool {
        self.pos + 1 == self.schedule.len()
    }

    /// Move to the next node. Must not be called at the last node.
    pub fn advance(&mut self) {
        debug_assert!(!self.at_last());
        self.pos += 1;
    }
}
