//! Entity drag/link state machine.
//!
//! Translates pointer events over an entity into `InteractionAction`s that
//! the session applies to the project:
//!
//! | State     | Event                          | Next      | Action                 |
//! |-----------|--------------------------------|-----------|------------------------|
//! | `Idle`    | primary down on entity         | `Moving`  | `MoveStarted`          |
//! | `Moving`  | move                           | `Moving`  | `MoveEntityTo`         |
//! | `Moving`  | up / up outside                | `Idle`    | `MoveFinished`         |
//! | `Idle`    | secondary down on entity       | `Linking` |                        |
//! | `Linking` | enter another entity           | `Idle`    | `CreateEdge`           |
//! | `Linking` | up at the press location       | `Idle`    | `OpenContextMenu`      |
//! | `Linking` | up elsewhere / up outside      | `Idle`    |                        |

use crate::input::{InputEvent, PointerButton};
use crate::viewport::Viewport;
use prg_core::{Point, StageId};

/// The entity under the pointer when a gesture starts, with the origin of
/// its rect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub id: StageId,
    pub location: Point,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum InteractionState {
    #[default]
    Idle,
    Moving {
        entity: StageId,
        press_world: Point,
        start_location: Point,
    },
    Linking {
        entity: StageId,
        press_world: Point,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum InteractionAction {
    MoveStarted { entity: StageId },
    /// Absolute target location for the entity's rect origin.
    MoveEntityTo { entity: StageId, location: Point },
    MoveFinished { entity: StageId },
    CreateEdge { from: StageId, to: StageId },
    /// Secondary press released in place: a context menu, not a link.
    OpenContextMenu { entity: StageId, screen: Point },
}

#[derive(Debug, Clone, Default)]
pub struct EntityInteraction {
    state: InteractionState,
    /// Maximum world distance between press and release still counted as
    /// "in place".
    tolerance: f64,
}

impl EntityInteraction {
    pub fn new(tolerance: f64) -> Self {
        Self {
            state: InteractionState::Idle,
            tolerance,
        }
    }

    pub fn state(&self) -> InteractionState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == InteractionState::Idle
    }

    /// Entity currently being dragged or linked from.
    pub fn active_entity(&self) -> Option<StageId> {
        match self.state {
            InteractionState::Idle => None,
            InteractionState::Moving { entity, .. } | InteractionState::Linking { entity, .. } => {
                Some(entity)
            }
        }
    }

    /// Feed one event. `hit` is the entity under the pointer for
    /// `PointerDown`; it is ignored for every other event.
    pub fn handle(
        &mut self,
        event: &InputEvent,
        hit: Option<Hit>,
        viewport: &dyn Viewport,
    ) -> Vec<InteractionAction> {
        let (next, actions) = match (self.state, event) {
            (InteractionState::Idle, InputEvent::PointerDown { x, y, button }) => {
                let Some(hit) = hit else {
                    return vec![];
                };
                let press_world = viewport.to_world(Point::new(*x, *y));
                match button {
                    PointerButton::Primary => (
                        InteractionState::Moving {
                            entity: hit.id,
                            press_world,
                            start_location: hit.location,
                        },
                        vec![InteractionAction::MoveStarted { entity: hit.id }],
                    ),
                    PointerButton::Secondary => (
                        InteractionState::Linking {
                            entity: hit.id,
                            press_world,
                        },
                        vec![],
                    ),
                    PointerButton::Middle => return vec![],
                }
            }

            (
                InteractionState::Moving {
                    entity,
                    press_world,
                    start_location,
                },
                InputEvent::PointerMove { x, y },
            ) => {
                // Offset from the press point, not from the previous frame.
                let world = viewport.to_world(Point::new(*x, *y));
                let location = start_location + (world - press_world);
                (
                    self.state,
                    vec![InteractionAction::MoveEntityTo { entity, location }],
                )
            }

            (
                InteractionState::Moving { entity, .. },
                InputEvent::PointerUp { .. } | InputEvent::PointerUpOutside,
            ) => (
                InteractionState::Idle,
                vec![InteractionAction::MoveFinished { entity }],
            ),

            (InteractionState::Linking { entity, .. }, InputEvent::PointerEnter { target })
                if *target != entity =>
            {
                (
                    InteractionState::Idle,
                    vec![InteractionAction::CreateEdge {
                        from: entity,
                        to: *target,
                    }],
                )
            }

            (InteractionState::Linking { entity, press_world }, InputEvent::PointerUp { x, y }) => {
                let screen = Point::new(*x, *y);
                let world = viewport.to_world(screen);
                if world.distance(press_world) <= self.tolerance {
                    (
                        InteractionState::Idle,
                        vec![InteractionAction::OpenContextMenu { entity, screen }],
                    )
                } else {
                    log::debug!("link from {entity} released on empty canvas");
                    (InteractionState::Idle, vec![])
                }
            }

            (InteractionState::Linking { entity, .. }, InputEvent::PointerUpOutside) => {
                log::debug!("link from {entity} cancelled");
                (InteractionState::Idle, vec![])
            }

            (state, _) => (state, vec![]),
        };
        if next != self.state {
            log::trace!("interaction {:?} -> {:?}", self.state, next);
        }
        self.state = next;
        actions
    }
}
