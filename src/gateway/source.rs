use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

/// Raw chat text as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub chat_id: i64,
    pub text: String,
}

impl InboundMessage {
    pub fn new(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
        }
    }
}

#[async_trait]
pub trait MessageSource: Send {
    /// Next message in delivery order; `None` once the source is exhausted.
    async fn recv(&mut self) -> Option<InboundMessage>;
}

/// Reads messages from stdin. A blank line ends a message.
///
/// `recv` is cancel-safe: a half-read message survives a dropped future.
pub struct StdinSource {
    chat_id: i64,
    lines: Lines<BufReader<Stdin>>,
    block: Vec<String>,
    done: bool,
}

impl StdinSource {
    pub fn new(chat_id: i64) -> Self {
        Self {
            chat_id,
            lines: BufReader::new(tokio::io::stdin()).lines(),
            block: Vec::new(),
            done: false,
        }
    }
}

#[async_trait]
impl MessageSource for StdinSource {
    async fn recv(&mut self) -> Option<InboundMessage> {
        if self.done {
            return None;
        }
        loop {
            match self.lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => {
                    if !self.block.is_empty() {
                        break;
                    }
                }
                Ok(Some(line)) => self.block.push(line),
                Ok(None) | Err(_) => {
                    self.done = true;
                    break;
                }
            }
        }
        if self.block.is_empty() {
            None
        } else {
            let text = std::mem::take(&mut self.block).join("\n");
            Some(InboundMessage::new(self.chat_id, text))
        }
    }
}

/// A fixed queue of messages, for replays and tests.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    queue: VecDeque<InboundMessage>,
}

impl ScriptedSource {
    pub fn new(messages: impl IntoIterator<Item = InboundMessage>) -> Self {
        Self {
            queue: messages.into_iter().collect(),
        }
    }

    /// Split `text` into blank-line separated messages from `chat_id`.
    pub fn from_blocks(chat_id: i64, text: &str) -> Self {
        Self::new(split_blocks(text).into_iter().map(|b| InboundMessage::new(chat_id, b)))
    }

    pub fn push(&mut self, message: InboundMessage) {
        self.queue.push_back(message);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[async_trait]
impl MessageSource for ScriptedSource {
    async fn recv(&mut self) -> Option<InboundMessage> {
        self.queue.pop_front()
    }
}

pub fn split_blocks(text: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        blocks.push(current.join("\n"));
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_source_splits_on_blank_lines() {
        let mut src = ScriptedSource::from_blocks(7, "close all\n\n\nBuy Now\nLots=2\nTP1->3470\n");
        assert_eq!(src.len(), 2);
        assert_eq!(src.recv().await, Some(InboundMessage::new(7, "close all")));
        let second = src.recv().await.unwrap();
        assert_eq!(second.text, "Buy Now\nLots=2\nTP1->3470");
        assert!(src.recv().await.is_none());
    }
}
