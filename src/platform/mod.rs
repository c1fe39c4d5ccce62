// ABOUTME: Chat platform transports implementing slink-core's Transport trait
// ABOUTME: Slack is the only platform

pub mod slack;

pub use slack::SlackTransport;
