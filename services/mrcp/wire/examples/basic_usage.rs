//! Basic usage example for the MRCPv2 wire layer.

use bytes::BytesMut;
use mrcp_wire::{
    ChannelIdentifier, CompletionCause, Decoded, EventName, FrameDecoder, MessageBuilder,
    MessageEncoder, MethodName, RequestState, ResourceType, StatusCode, COMPLETION_CAUSE,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== MRCPv2 Wire Example ===\n");

    let registry = mrcp_wire::registry::global();
    let encoder = MessageEncoder::new(registry.clone());
    let mut decoder = FrameDecoder::new(registry);
    let channel = ChannelIdentifier::new("32AECB23433801", ResourceType::SpeechSynth)?;

    // 1. A SPEAK request with an SSML body
    println!("1. Encoding a SPEAK request...");
    let speak = MessageBuilder::request(MethodName::Speak)
        .request_id(543257)
        .channel(channel.clone())
        .header("Voice-gender", "neutral")
        .header("Content-Type", "application/ssml+xml")
        .body("<speak>Hello, world</speak>")
        .build()?;
    let wire = encoder.encode_to_bytes(&speak)?;
    println!("{}", String::from_utf8_lossy(&wire));

    // 2. The server's answers, pipelined into one buffer
    println!("2. Decoding a pipelined response and event...");
    let in_progress = MessageBuilder::response(StatusCode::Success, RequestState::InProgress)
        .request_id(543257)
        .channel(channel.clone())
        .build()?;
    let complete = MessageBuilder::event(EventName::SpeakComplete, RequestState::Complete)
        .request_id(543257)
        .channel(channel)
        .header(COMPLETION_CAUSE, CompletionCause::new(0, "normal"))
        .build()?;

    let mut buf = BytesMut::new();
    encoder.encode(&in_progress, &mut buf)?;
    encoder.encode(&complete, &mut buf)?;

    for decoded in decoder.decode_all(&mut buf)? {
        match decoded {
            Decoded::Message(message) => println!(
                "   {:?} request-id={:?} state={:?} ({} bytes)",
                message.kind,
                message.request_id,
                message.request_state(),
                message.length
            ),
            Decoded::Rejected { error, .. } => println!("   rejected: {}", error),
        }
    }

    println!("\n=== Example completed successfully! ===");
    Ok(())
}
