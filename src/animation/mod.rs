mod plan;
mod player;

pub use plan::{
    build_plan, visual, AnimationPlan, ConnectionPulse, Direction, PlanTiming, TimedStep,
    VisualValue,
};
pub use player::{AnimationPlayer, PlaybackEvent};
