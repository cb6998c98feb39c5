//! Local event line reader.
//!
//! One event per line:
//! ```text
//! prompt Someone has put this room on hold
//! room-in-use True
//! room-in-use False
//! ```
//! Malformed lines are logged and skipped.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use beacon_core::{CoreError, LocalEvent};

/// Reads events from `reader` until end of input or until the receiver is
/// dropped. Returns the number of events forwarded.
pub async fn forward_events<R>(reader: R, tx: mpsc::Sender<LocalEvent>) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut forwarded = 0;

    while let Some(line) = lines.next_line().await? {
        let event = match LocalEvent::parse_line(&line) {
            Ok(event) => event,
            Err(CoreError::EmptyEvent) => continue,
            Err(e) => {
                warn!(line = %line, error = %e, "Skipping malformed event line");
                continue;
            }
        };

        debug!(?event, "Local event");
        if tx.send(event).await.is_err() {
            break;
        }
        forwarded += 1;
    }

    Ok(forwarded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_forwards_valid_lines_in_order() {
        let input: &[u8] = b"prompt Someone has put this room on hold\n\
                             \n\
                             room-in-use True\n\
                             bogus line\n\
                             room-in-use maybe\n\
                             room-in-use False\n";
        let (tx, mut rx) = mpsc::channel(8);

        let forwarded = forward_events(input, tx).await.unwrap();
        assert_eq!(forwarded, 3);

        assert_eq!(
            rx.recv().await,
            Some(LocalEvent::PromptDisplayed {
                text: "Someone has put this room on hold".into()
            })
        );
        assert_eq!(
            rx.recv().await,
            Some(LocalEvent::OccupancyChanged { occupied: true })
        );
        assert_eq!(
            rx.recv().await,
            Some(LocalEvent::OccupancyChanged { occupied: false })
        );
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_stops_when_receiver_dropped() {
        let input: &[u8] = b"room-in-use True\nroom-in-use False\n";
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        assert_eq!(forward_events(input, tx).await.unwrap(), 0);
    }
}
