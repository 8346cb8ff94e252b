//! Unordered effect parsing
//!
//! Several effects can fire between two known points of a battle log in an
//! order the engine cannot predict (switch-in abilities of both sides,
//! end-of-turn residuals). The dispatchers express each candidate effect as
//! an [`EffectParser`] and race them over a shared [`EventWindow`]:
//!
//! - every pending parser is offered the event at the cursor, engaged parser
//!   first (a parser that consumed an event gets priority until it finishes);
//! - the first event no parser will take is the deadline: anything still
//!   pending after it provably did not activate, and its [`cancel`]
//!   (`EffectParser::cancel`) turns that fact into narrowing;
//! - a `rejectable` parser that gives up mid-match rewinds the cursor to
//!   where it engaged, putting its consumed events back up for grabs.

use zoroark_protocol::Event;

use crate::dex::Dex;
use crate::error::{InferenceError, Result};
use crate::state::battle::BattleState;

/// Mutable context every parser callback receives.
pub struct InferenceContext<'a> {
    pub state: &'a mut BattleState,
    pub dex: &'a Dex,
}

/// Cursor over a slice of events, with rewind support.
#[derive(Debug)]
pub struct EventWindow<'a> {
    events: &'a [Event],
    cursor: usize,
}

impl<'a> EventWindow<'a> {
    pub fn new(events: &'a [Event]) -> Self {
        EventWindow { events, cursor: 0 }
    }

    pub fn peek(&self) -> Option<&'a Event> {
        self.events.get(self.cursor)
    }

    pub fn advance(&mut self) {
        self.cursor += 1;
    }

    pub fn mark(&self) -> usize {
        self.cursor
    }

    pub fn rewind(&mut self, mark: usize) {
        self.cursor = mark;
    }

    pub fn is_empty(&self) -> bool {
        self.cursor >= self.events.len()
    }
}

/// A parser's verdict on one offered event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    /// Took the event; more events are needed to finish.
    Consume,
    /// Took the event and finished matching.
    Accept,
    /// Not my event; offer it to someone else.
    Pass,
    /// This effect cannot match anymore.
    Reject,
}

/// One candidate effect in a race.
pub trait EffectParser {
    /// For error messages and logs.
    fn label(&self) -> String;

    /// Inspect the event at the cursor. Returning [`Feed::Consume`] or
    /// [`Feed::Accept`] claims it; side effects of accepted events are
    /// applied here.
    fn offer(&mut self, cx: &mut InferenceContext<'_>, event: &Event) -> Result<Feed>;

    /// Called when the race ends without this parser accepting: the effect
    /// provably did not activate.
    fn cancel(&mut self, cx: &mut InferenceContext<'_>) -> Result<()>;

    /// Whether giving up after consuming events is tolerable (the consumed
    /// events rewind) rather than a stream error.
    fn rejectable(&self) -> bool {
        false
    }
}

/// Progress of one racer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Accepted,
    Rejected,
}

pub struct RaceTask<P> {
    pub parser: P,
    pub state: TaskState,
}

impl<P: EffectParser> RaceTask<P> {
    pub fn new(parser: P) -> Self {
        RaceTask {
            parser,
            state: TaskState::Pending,
        }
    }
}

/// Run one race round: feed events to pending tasks until one accepts or no
/// task will take the event at the cursor. Returns the accepting task index.
/// Does not cancel the losers; [`one_of`] and [`all`] layer that on.
fn race_round<P: EffectParser>(
    cx: &mut InferenceContext<'_>,
    window: &mut EventWindow<'_>,
    tasks: &mut [RaceTask<P>],
) -> Result<Option<usize>> {
    let mut engaged: Option<(usize, usize)> = None;

    'stream: while let Some(event) = window.peek() {
        // engaged parser first, then the rest in declaration order
        let order: Vec<usize> = engaged
            .iter()
            .map(|(i, _)| *i)
            .chain(
                (0..tasks.len())
                    .filter(|i| tasks[*i].state == TaskState::Pending)
                    .filter(|i| engaged.map_or(true, |(e, _)| e != *i)),
            )
            .collect();

        for i in order {
            match tasks[i].parser.offer(cx, event)? {
                Feed::Consume => {
                    if engaged.is_none() {
                        engaged = Some((i, window.mark()));
                    }
                    window.advance();
                    continue 'stream;
                }
                Feed::Accept => {
                    window.advance();
                    tasks[i].state = TaskState::Accepted;
                    tracing::debug!(effect = %tasks[i].parser.label(), "effect parser accepted");
                    return Ok(Some(i));
                }
                Feed::Pass => {
                    if engaged.is_some_and(|(e, _)| e == i) {
                        // an engaged parser must finish or reject
                        disengage(window, tasks, &mut engaged, i)?;
                        continue 'stream;
                    }
                }
                Feed::Reject => {
                    tasks[i].state = TaskState::Rejected;
                    if engaged.is_some_and(|(e, _)| e == i) {
                        disengage(window, tasks, &mut engaged, i)?;
                        continue 'stream;
                    }
                }
            }
        }

        // deadline: nobody wants this event
        if let Some((i, _)) = engaged {
            disengage(window, tasks, &mut engaged, i)?;
            continue 'stream;
        }
        break;
    }

    // stream exhausted while a parser was mid-match
    if let Some((i, _)) = engaged {
        disengage(window, tasks, &mut engaged, i)?;
    }
    Ok(None)
}

/// Drop an engaged parser out of the race, rewinding its consumed events if
/// it tolerates rejection.
fn disengage<P: EffectParser>(
    window: &mut EventWindow<'_>,
    tasks: &mut [RaceTask<P>],
    engaged: &mut Option<(usize, usize)>,
    i: usize,
) -> Result<()> {
    let Some((_, mark)) = engaged.take() else {
        return Ok(());
    };
    if !tasks[i].parser.rejectable() {
        return Err(InferenceError::UnexpectedEvent {
            effect: tasks[i].parser.label(),
            detail: "event stream diverged mid-match".to_string(),
        });
    }
    tracing::debug!(effect = %tasks[i].parser.label(), "rejectable parser rewound");
    tasks[i].state = TaskState::Rejected;
    window.rewind(mark);
    Ok(())
}

/// Cancel every task that did not accept.
fn cancel_losers<P: EffectParser>(
    cx: &mut InferenceContext<'_>,
    tasks: &mut [RaceTask<P>],
) -> Result<()> {
    for task in tasks.iter_mut() {
        if task.state != TaskState::Accepted {
            task.parser.cancel(cx)?;
        }
    }
    Ok(())
}

/// Race mutually-exclusive candidates: at most one can activate. Whether or
/// not one accepts, every other candidate is cancelled.
pub fn one_of<P: EffectParser>(
    cx: &mut InferenceContext<'_>,
    window: &mut EventWindow<'_>,
    tasks: &mut [RaceTask<P>],
) -> Result<Option<usize>> {
    let accepted = race_round(cx, window, tasks)?;
    cancel_losers(cx, tasks)?;
    Ok(accepted)
}

/// Race independent candidates: any subset can activate, in any order. Rounds
/// repeat until a round accepts nothing; the still-pending rest is cancelled.
pub fn all<P: EffectParser>(
    cx: &mut InferenceContext<'_>,
    window: &mut EventWindow<'_>,
    tasks: &mut [RaceTask<P>],
) -> Result<Vec<usize>> {
    let mut accepted = Vec::new();
    loop {
        // rejected tasks get a fresh chance each round only if still pending;
        // a Rejected verdict is final, so just rerun over pending ones
        match race_round(cx, window, tasks)? {
            Some(i) => accepted.push(i),
            None => break,
        }
    }
    cancel_losers(cx, tasks)?;
    Ok(accepted)
}
