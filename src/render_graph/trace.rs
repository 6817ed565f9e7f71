//! Per-frame record of which stages ran and how they ended.

use std::fmt;

use crate::passes::probe::BakeStats;

/// A stage of the frame, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FramePass {
    GeometryPrepass,
    ShadowCascades,
    ProbeBake,
    GlobalIllumination,
    LocalIllumination,
    DebugOverlay,
    SunSky,
    Volumetrics,
    PostProcessing,
    UiOverlay,
}

impl FramePass {
    /// Every stage in the order a frame visits them.
    pub const ORDER: [FramePass; 10] = [
        FramePass::GeometryPrepass,
        FramePass::ShadowCascades,
        FramePass::ProbeBake,
        FramePass::GlobalIllumination,
        FramePass::LocalIllumination,
        FramePass::DebugOverlay,
        FramePass::SunSky,
        FramePass::Volumetrics,
        FramePass::PostProcessing,
        FramePass::UiOverlay,
    ];

    pub fn label(self) -> &'static str {
        match self {
            FramePass::GeometryPrepass => "geometry-prepass",
            FramePass::ShadowCascades => "shadow-cascades",
            FramePass::ProbeBake => "probe-bake",
            FramePass::GlobalIllumination => "global-illumination",
            FramePass::LocalIllumination => "local-illumination",
            FramePass::DebugOverlay => "debug-overlay",
            FramePass::SunSky => "sun-sky",
            FramePass::Volumetrics => "volumetrics",
            FramePass::PostProcessing => "post-processing",
            FramePass::UiOverlay => "ui-overlay",
        }
    }

    /// Only these stages may be left out of a frame.
    pub fn is_optional(self) -> bool {
        matches!(self, FramePass::ProbeBake | FramePass::DebugOverlay)
    }
}

impl fmt::Display for FramePass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How a stage ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PassOutcome {
    Completed { draws: usize },
    Skipped,
    /// The stage failed; its targets keep the previous frame's contents.
    Aborted(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PassRecord {
    pub pass: FramePass,
    pub outcome: PassOutcome,
}

/// Ordered list of the stages one frame visited.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameTrace {
    records: Vec<PassRecord>,
}

impl FrameTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, pass: FramePass, outcome: PassOutcome) {
        self.records.push(PassRecord { pass, outcome });
    }

    pub fn records(&self) -> &[PassRecord] {
        &self.records
    }

    /// Stages that ran (completed or aborted), in order.
    pub fn executed(&self) -> Vec<FramePass> {
        self.records
            .iter()
            .filter(|r| r.outcome != PassOutcome::Skipped)
            .map(|r| r.pass)
            .collect()
    }

    pub fn outcome(&self, pass: FramePass) -> Option<&PassOutcome> {
        self.records
            .iter()
            .find(|r| r.pass == pass)
            .map(|r| &r.outcome)
    }

    pub fn ran(&self, pass: FramePass) -> bool {
        matches!(
            self.outcome(pass),
            Some(PassOutcome::Completed { .. } | PassOutcome::Aborted(_))
        )
    }

    /// Mesh draws issued by `pass`, zero if it did not complete.
    pub fn draws(&self, pass: FramePass) -> usize {
        match self.outcome(pass) {
            Some(PassOutcome::Completed { draws }) => *draws,
            _ => 0,
        }
    }
}

/// Summary of one rendered frame.
#[derive(Clone, Debug, Default)]
pub struct FrameReport {
    pub frame_index: u64,
    pub trace: FrameTrace,
    /// Stages that failed and why.
    pub aborted: Vec<(FramePass, String)>,
    pub probes_baked: Vec<BakeStats>,
    pub shadows_recomputed: bool,
    pub visible_objects: usize,
}

impl FrameReport {
    pub fn is_clean(&self) -> bool {
        self.aborted.is_empty()
    }

    pub fn total_draws(&self) -> usize {
        FramePass::ORDER.iter().map(|p| self.trace.draws(*p)).sum()
    }
}
