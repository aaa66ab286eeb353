//! Loopback resources.
//!
//! Stand-in media resources that answer every supported request with a
//! canned completion and never touch audio. They make the server usable end
//! to end without a speech engine behind it.

use async_trait::async_trait;
use mrcp_session::{
    HandlerRegistry, Recognizer, RecognizerHandler, Recorder, RecorderHandler, RequestContext,
    Synthesizer, SynthesizerHandler, Verifier, VerifierHandler,
};
use mrcp_wire::{
    CompletionCause, EventName, Message, RequestState, ResourceFamily, ResourceType, StatusCode,
    COMPLETION_CAUSE, CONTENT_TYPE,
};
use tracing::debug;

const NLSML: &str = "application/nlsml+xml";

fn complete(ctx: &RequestContext) -> anyhow::Result<Message> {
    Ok(ctx
        .response(StatusCode::Success, RequestState::Complete)
        .build()?)
}

/// Acknowledge with IN-PROGRESS, then finish with a `COMPLETE` event
fn run_to_completion(
    ctx: &RequestContext,
    name: EventName,
    cause: CompletionCause,
    result: Option<String>,
) -> anyhow::Result<Message> {
    ctx.send(ctx.response(StatusCode::Success, RequestState::InProgress))?;
    let mut event = ctx
        .event(name, RequestState::Complete)
        .header(COMPLETION_CAUSE, cause);
    if let Some(result) = result {
        event = event.header(CONTENT_TYPE, NLSML).body(result);
    }
    Ok(event.build()?)
}

/// Recognizer that matches every utterance to the same interpretation
pub struct LoopbackRecognizer {
    input_mode: &'static str,
}

impl LoopbackRecognizer {
    pub fn new(resource: ResourceType) -> Self {
        let input_mode = match resource {
            ResourceType::DtmfRecog => "dtmf",
            _ => "speech",
        };
        Self { input_mode }
    }

    fn result(&self) -> String {
        format!(
            "<?xml version=\"1.0\"?>\r\n<result>\r\n  <interpretation confidence=\"1.0\">\r\n    \
             <instance/>\r\n    <input mode=\"{}\">loopback</input>\r\n  </interpretation>\r\n</result>\r\n",
            self.input_mode
        )
    }
}

#[async_trait]
impl RecognizerHandler for LoopbackRecognizer {
    async fn set_params(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        complete(&ctx)
    }

    async fn get_params(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        complete(&ctx)
    }

    async fn define_grammar(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        Ok(ctx
            .response(StatusCode::Success, RequestState::Complete)
            .header(COMPLETION_CAUSE, CompletionCause::new(0, "success"))
            .build()?)
    }

    async fn recognize(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        debug!(channel = %ctx.channel(), "loopback recognition");
        run_to_completion(
            &ctx,
            EventName::RecognitionComplete,
            CompletionCause::new(0, "success"),
            Some(self.result()),
        )
    }

    async fn interpret(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        run_to_completion(
            &ctx,
            EventName::InterpretationComplete,
            CompletionCause::new(0, "success"),
            Some(self.result()),
        )
    }

    async fn start_input_timers(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        complete(&ctx)
    }

    async fn stop(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        complete(&ctx)
    }
}

/// Synthesizer that "speaks" instantly
pub struct LoopbackSynthesizer;

#[async_trait]
impl SynthesizerHandler for LoopbackSynthesizer {
    async fn set_params(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        complete(&ctx)
    }

    async fn get_params(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        complete(&ctx)
    }

    async fn speak(&self, request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        debug!(channel = %ctx.channel(), bytes = request.body.len(), "loopback speak");
        run_to_completion(
            &ctx,
            EventName::SpeakComplete,
            CompletionCause::new(0, "normal"),
            None,
        )
    }

    async fn stop(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        complete(&ctx)
    }

    async fn define_lexicon(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        complete(&ctx)
    }
}

/// Recorder that records nothing
pub struct LoopbackRecorder;

#[async_trait]
impl RecorderHandler for LoopbackRecorder {
    async fn set_params(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        complete(&ctx)
    }

    async fn get_params(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        complete(&ctx)
    }

    async fn record(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        run_to_completion(
            &ctx,
            EventName::RecordComplete,
            CompletionCause::new(2, "no-input-timeout"),
            None,
        )
    }

    async fn stop(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        complete(&ctx)
    }

    async fn start_input_timers(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        complete(&ctx)
    }
}

/// Verifier that accepts every speaker
pub struct LoopbackVerifier;

#[async_trait]
impl VerifierHandler for LoopbackVerifier {
    async fn set_params(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        complete(&ctx)
    }

    async fn get_params(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        complete(&ctx)
    }

    async fn start_session(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        complete(&ctx)
    }

    async fn end_session(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        complete(&ctx)
    }

    async fn verify(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        run_to_completion(
            &ctx,
            EventName::VerificationComplete,
            CompletionCause::new(0, "success"),
            None,
        )
    }

    async fn verify_from_buffer(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        run_to_completion(
            &ctx,
            EventName::VerificationComplete,
            CompletionCause::new(0, "success"),
            None,
        )
    }

    async fn clear_buffer(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        complete(&ctx)
    }

    async fn stop(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        complete(&ctx)
    }
}

/// Register loopback handlers for each listed resource type
pub fn register_loopback(handlers: &mut HandlerRegistry, resources: &[ResourceType]) {
    for &resource in resources {
        match resource.family() {
            ResourceFamily::Recognizer => handlers
                .register_handler(resource, move |_| Recognizer(LoopbackRecognizer::new(resource))),
            ResourceFamily::Synthesizer => {
                handlers.register_handler(resource, |_| Synthesizer(LoopbackSynthesizer))
            }
            ResourceFamily::Recorder => handlers.register_handler(resource, |_| Recorder(LoopbackRecorder)),
            ResourceFamily::Verifier => handlers.register_handler(resource, |_| Verifier(LoopbackVerifier)),
        }
    }
}
