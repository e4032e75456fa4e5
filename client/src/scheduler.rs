use std::{
    collections::BTreeMap,
    sync::mpsc::{channel, RecvTimeoutError, Sender},
    thread::{Builder, JoinHandle},
    time::{Duration, Instant},
};

use tracing::{trace, warn};

use crate::event::Event;

/// one display refresh.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Timer {
    Frame,
    Reconnect,
    FinishGame,
    Keepalive,
}

pub trait Scheduler {
    /// fires `timer` back into the event loop once `delay` has passed.
    fn schedule(&mut self, delay: Duration, timer: Timer) -> TimerId;

    /// a cancelled timer may still be delivered if it was already in flight,
    /// callers match the id against the timers they still hold.
    fn cancel(&mut self, id: TimerId);
}

enum Command {
    Schedule {
        id: TimerId,
        deadline: Instant,
        timer: Timer,
    },
    Cancel(TimerId),
}

/// a single thread holding every pending deadline, delivering them as [`Event::Timer`].
pub struct TimerThread {
    next_id: u64,
    commands: Option<Sender<Command>>,
    handle: Option<JoinHandle<()>>,
}

impl TimerThread {
    pub fn spawn(events: Sender<Event>) -> std::io::Result<Self> {
        let (commands_tx, commands_rx) = channel();
        let handle = Builder::new()
            .name("timer".to_owned())
            .spawn(move || {
                let mut pending = BTreeMap::<(Instant, TimerId), Timer>::new();
                loop {
                    let now = Instant::now();
                    while let Some(entry) = pending.first_entry() {
                        if entry.key().0 > now {
                            break;
                        }
                        let ((_, id), timer) = entry.remove_entry();
                        trace!(?id, ?timer, "timer fired");
                        if events.send(Event::Timer(id, timer)).is_err() {
                            return;
                        }
                    }
                    let command = match pending.keys().next() {
                        Some((deadline, _)) => {
                            match commands_rx.recv_timeout(deadline.saturating_duration_since(now))
                            {
                                Ok(command) => command,
                                Err(RecvTimeoutError::Timeout) => continue,
                                Err(RecvTimeoutError::Disconnected) => return,
                            }
                        }
                        None => match commands_rx.recv() {
                            Ok(command) => command,
                            Err(_) => return,
                        },
                    };
                    match command {
                        Command::Schedule {
                            id,
                            deadline,
                            timer,
                        } => {
                            pending.insert((deadline, id), timer);
                        }
                        Command::Cancel(id) => pending.retain(|(_, pending_id), _| *pending_id != id),
                    }
                }
            })?;
        Ok(Self {
            next_id: 0,
            commands: Some(commands_tx),
            handle: Some(handle),
        })
    }
}

impl Scheduler for TimerThread {
    fn schedule(&mut self, delay: Duration, timer: Timer) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        let command = Command::Schedule {
            id,
            deadline: Instant::now() + delay,
            timer,
        };
        if let Some(Err(_)) = self.commands.as_ref().map(|commands| commands.send(command)) {
            warn!(?timer, "timer thread is gone, timer dropped");
        }
        id
    }

    fn cancel(&mut self, id: TimerId) {
        if let Some(commands) = &self.commands {
            let _ = commands.send(Command::Cancel(id));
        }
    }
}

impl Drop for TimerThread {
    fn drop(&mut self) {
        // closing the command channel ends the thread.
        self.commands.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::mpsc::channel, time::Duration};

    use crate::{
        event::Event,
        scheduler::{Scheduler, Timer, TimerThread},
    };

    #[test]
    fn fires_in_deadline_order() {
        let (events_tx, events_rx) = channel();
        let mut timers = TimerThread::spawn(events_tx).unwrap();
        let late = timers.schedule(Duration::from_millis(60), Timer::Reconnect);
        let early = timers.schedule(Duration::from_millis(5), Timer::Frame);
        let timeout = Duration::from_secs(2);
        assert_eq!(
            events_rx.recv_timeout(timeout).unwrap(),
            Event::Timer(early, Timer::Frame)
        );
        assert_eq!(
            events_rx.recv_timeout(timeout).unwrap(),
            Event::Timer(late, Timer::Reconnect)
        );
    }

    #[test]
    fn cancelled_timer_does_not_fire() {
        let (events_tx, events_rx) = channel();
        let mut timers = TimerThread::spawn(events_tx).unwrap();
        let cancelled = timers.schedule(Duration::from_millis(40), Timer::Keepalive);
        let kept = timers.schedule(Duration::from_millis(80), Timer::FinishGame);
        timers.cancel(cancelled);
        assert_eq!(
            events_rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            Event::Timer(kept, Timer::FinishGame)
        );
        assert!(events_rx.recv_timeout(Duration::from_millis(50)).is_err());
    }
}
