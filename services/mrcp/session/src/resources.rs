//! Per-family handler interfaces.
//!
//! Each resource family has its own trait with one operation per method of
//! its vocabulary. Every operation defaults to a 401 (method not allowed)
//! answer, so an implementation only overrides what it supports. The
//! adapters [`Recognizer`], [`Synthesizer`], [`Recorder`] and [`Verifier`]
//! turn a family implementation into a [`ResourceHandler`] by dispatching on
//! the method token.

use crate::context::RequestContext;
use crate::handler::ResourceHandler;
use async_trait::async_trait;
use mrcp_wire::{Message, MethodName, RequestState, StatusCode};
use tracing::debug;

/// Terminal 401 for a method outside the channel's vocabulary
pub fn method_not_allowed(ctx: &RequestContext) -> anyhow::Result<Message> {
    Ok(ctx
        .response(StatusCode::MethodNotAllowed, RequestState::Complete)
        .build()?)
}

/// speechrecog and dtmfrecog resources
#[async_trait]
pub trait RecognizerHandler: Send + Sync {
    /// SET-PARAMS
    async fn set_params(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        method_not_allowed(&ctx)
    }
    /// GET-PARAMS
    async fn get_params(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        method_not_allowed(&ctx)
    }
    /// DEFINE-GRAMMAR
    async fn define_grammar(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        method_not_allowed(&ctx)
    }
    /// RECOGNIZE
    async fn recognize(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        method_not_allowed(&ctx)
    }
    /// INTERPRET
    async fn interpret(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        method_not_allowed(&ctx)
    }
    /// GET-RESULT
    async fn get_result(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        method_not_allowed(&ctx)
    }
    /// START-INPUT-TIMERS
    async fn start_input_timers(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        method_not_allowed(&ctx)
    }
    /// STOP
    async fn stop(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        method_not_allowed(&ctx)
    }
    /// START-PHRASE-ENROLLMENT
    async fn start_phrase_enrollment(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        method_not_allowed(&ctx)
    }
    /// ENROLLMENT-ROLLBACK
    async fn enrollment_rollback(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        method_not_allowed(&ctx)
    }
    /// END-PHRASE-ENROLLMENT
    async fn end_phrase_enrollment(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        method_not_allowed(&ctx)
    }
    /// MODIFY-PHRASE
    async fn modify_phrase(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        method_not_allowed(&ctx)
    }
    /// DELETE-PHRASE
    async fn delete_phrase(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        method_not_allowed(&ctx)
    }
}

/// speechsynth and basicsynth resources
#[async_trait]
pub trait SynthesizerHandler: Send + Sync {
    /// SET-PARAMS
    async fn set_params(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        method_not_allowed(&ctx)
    }
    /// GET-PARAMS
    async fn get_params(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        method_not_allowed(&ctx)
    }
    /// SPEAK
    async fn speak(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        method_not_allowed(&ctx)
    }
    /// STOP
    async fn stop(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        method_not_allowed(&ctx)
    }
    /// PAUSE
    async fn pause(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        method_not_allowed(&ctx)
    }
    /// RESUME
    async fn resume(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        method_not_allowed(&ctx)
    }
    /// BARGE-IN-OCCURRED
    async fn barge_in_occurred(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        method_not_allowed(&ctx)
    }
    /// CONTROL
    async fn control(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        method_not_allowed(&ctx)
    }
    /// DEFINE-LEXICON
    async fn define_lexicon(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        method_not_allowed(&ctx)
    }
}

/// recorder resources
#[async_trait]
pub trait RecorderHandler: Send + Sync {
    /// SET-PARAMS
    async fn set_params(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        method_not_allowed(&ctx)
    }
    /// GET-PARAMS
    async fn get_params(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        method_not_allowed(&ctx)
    }
    /// RECORD
    async fn record(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        method_not_allowed(&ctx)
    }
    /// STOP
    async fn stop(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        method_not_allowed(&ctx)
    }
    /// START-INPUT-TIMERS
    async fn start_input_timers(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        method_not_allowed(&ctx)
    }
}

/// speakverify resources
#[async_trait]
pub trait VerifierHandler: Send + Sync {
    /// SET-PARAMS
    async fn set_params(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        method_not_allowed(&ctx)
    }
    /// GET-PARAMS
    async fn get_params(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        method_not_allowed(&ctx)
    }
    /// START-SESSION
    async fn start_session(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        method_not_allowed(&ctx)
    }
    /// END-SESSION
    async fn end_session(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        method_not_allowed(&ctx)
    }
    /// QUERY-VOICEPRINT
    async fn query_voiceprint(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        method_not_allowed(&ctx)
    }
    /// DELETE-VOICEPRINT
    async fn delete_voiceprint(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        method_not_allowed(&ctx)
    }
    /// VERIFY
    async fn verify(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        method_not_allowed(&ctx)
    }
    /// VERIFY-FROM-BUFFER
    async fn verify_from_buffer(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        method_not_allowed(&ctx)
    }
    /// VERIFY-ROLLBACK
    async fn verify_rollback(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        method_not_allowed(&ctx)
    }
    /// CLEAR-BUFFER
    async fn clear_buffer(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        method_not_allowed(&ctx)
    }
    /// START-INPUT-TIMERS
    async fn start_input_timers(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        method_not_allowed(&ctx)
    }
    /// GET-INTERMEDIATE-RESULT
    async fn get_intermediate_result(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        method_not_allowed(&ctx)
    }
    /// STOP
    async fn stop(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        method_not_allowed(&ctx)
    }
}

fn unsupported(method: Option<MethodName>, ctx: &RequestContext) -> anyhow::Result<Message> {
    debug!(channel = %ctx.channel(), ?method, "method not in channel vocabulary");
    method_not_allowed(ctx)
}

/// [`ResourceHandler`] over a [`RecognizerHandler`]
pub struct Recognizer<H>(pub H);

#[async_trait]
impl<H: RecognizerHandler> ResourceHandler for Recognizer<H> {
    async fn handle(&self, request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        let h = &self.0;
        match request.method().cloned() {
            Some(MethodName::SetParams) => h.set_params(request, ctx).await,
            Some(MethodName::GetParams) => h.get_params(request, ctx).await,
            Some(MethodName::DefineGrammar) => h.define_grammar(request, ctx).await,
            Some(MethodName::Recognize) => h.recognize(request, ctx).await,
            Some(MethodName::Interpret) => h.interpret(request, ctx).await,
            Some(MethodName::GetResult) => h.get_result(request, ctx).await,
            Some(MethodName::StartInputTimers) => h.start_input_timers(request, ctx).await,
            Some(MethodName::Stop) => h.stop(request, ctx).await,
            Some(MethodName::StartPhraseEnrollment) => h.start_phrase_enrollment(request, ctx).await,
            Some(MethodName::EnrollmentRollback) => h.enrollment_rollback(request, ctx).await,
            Some(MethodName::EndPhraseEnrollment) => h.end_phrase_enrollment(request, ctx).await,
            Some(MethodName::ModifyPhrase) => h.modify_phrase(request, ctx).await,
            Some(MethodName::DeletePhrase) => h.delete_phrase(request, ctx).await,
            other => unsupported(other, &ctx),
        }
    }
}

/// [`ResourceHandler`] over a [`SynthesizerHandler`]
pub struct Synthesizer<H>(pub H);

#[async_trait]
impl<H: SynthesizerHandler> ResourceHandler for Synthesizer<H> {
    async fn handle(&self, request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        let h = &self.0;
        match request.method().cloned() {
            Some(MethodName::SetParams) => h.set_params(request, ctx).await,
            Some(MethodName::GetParams) => h.get_params(request, ctx).await,
            Some(MethodName::Speak) => h.speak(request, ctx).await,
            Some(MethodName::Stop) => h.stop(request, ctx).await,
            Some(MethodName::Pause) => h.pause(request, ctx).await,
            Some(MethodName::Resume) => h.resume(request, ctx).await,
            Some(MethodName::BargeInOccurred) => h.barge_in_occurred(request, ctx).await,
            Some(MethodName::Control) => h.control(request, ctx).await,
            Some(MethodName::DefineLexicon) => h.define_lexicon(request, ctx).await,
            other => unsupported(other, &ctx),
        }
    }
}

/// [`ResourceHandler`] over a [`RecorderHandler`]
pub struct Recorder<H>(pub H);

#[async_trait]
impl<H: RecorderHandler> ResourceHandler for Recorder<H> {
    async fn handle(&self, request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        let h = &self.0;
        match request.method().cloned() {
            Some(MethodName::SetParams) => h.set_params(request, ctx).await,
            Some(MethodName::GetParams) => h.get_params(request, ctx).await,
            Some(MethodName::Record) => h.record(request, ctx).await,
            Some(MethodName::Stop) => h.stop(request, ctx).await,
            Some(MethodName::StartInputTimers) => h.start_input_timers(request, ctx).await,
            other => unsupported(other, &ctx),
        }
    }
}

/// [`ResourceHandler`] over a [`VerifierHandler`]
pub struct Verifier<H>(pub H);

#[async_trait]
impl<H: VerifierHandler> ResourceHandler for Verifier<H> {
    async fn handle(&self, request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
        let h = &self.0;
        match request.method().cloned() {
            Some(MethodName::SetParams) => h.set_params(request, ctx).await,
            Some(MethodName::GetParams) => h.get_params(request, ctx).await,
            Some(MethodName::StartSession) => h.start_session(request, ctx).await,
            Some(MethodName::EndSession) => h.end_session(request, ctx).await,
            Some(MethodName::QueryVoiceprint) => h.query_voiceprint(request, ctx).await,
            Some(MethodName::DeleteVoiceprint) => h.delete_voiceprint(request, ctx).await,
            Some(MethodName::Verify) => h.verify(request, ctx).await,
            Some(MethodName::VerifyFromBuffer) => h.verify_from_buffer(request, ctx).await,
            Some(MethodName::VerifyRollback) => h.verify_rollback(request, ctx).await,
            Some(MethodName::ClearBuffer) => h.clear_buffer(request, ctx).await,
            Some(MethodName::StartInputTimers) => h.start_input_timers(request, ctx).await,
            Some(MethodName::GetIntermediateResult) => h.get_intermediate_result(request, ctx).await,
            Some(MethodName::Stop) => h.stop(request, ctx).await,
            other => unsupported(other, &ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbound::Outbound;
    use mrcp_wire::{ChannelIdentifier, EventName, MessageBuilder, ResourceType};
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    struct Speaker;

    #[async_trait]
    impl SynthesizerHandler for Speaker {
        async fn speak(&self, _request: Message, ctx: RequestContext) -> anyhow::Result<Message> {
            ctx.send(ctx.response(StatusCode::Success, RequestState::InProgress))?;
            Ok(ctx
                .event(EventName::SpeakComplete, RequestState::Complete)
                .build()?)
        }
    }

    fn request(method: MethodName) -> (Message, RequestContext, mpsc::UnboundedReceiver<Message>) {
        let channel = ChannelIdentifier::new("s1", ResourceType::SpeechSynth).unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let outbound = Outbound::new(tx);
        outbound.register(4, &channel);
        let ctx = RequestContext::new(4, channel.clone(), outbound, Arc::new(AtomicBool::new(false)));
        let message = MessageBuilder::request(method)
            .request_id(4)
            .channel(channel)
            .build()
            .unwrap();
        (message, ctx, rx)
    }

    #[tokio::test]
    async fn test_dispatches_to_family_operation() {
        let handler = Synthesizer(Speaker);
        let (message, ctx, mut rx) = request(MethodName::Speak);
        let terminal = handler.handle(message, ctx).await.unwrap();
        assert_eq!(terminal.event_name(), Some(&EventName::SpeakComplete));
        assert_eq!(
            rx.try_recv().unwrap().request_state(),
            Some(RequestState::InProgress)
        );
    }

    #[tokio::test]
    async fn test_unimplemented_operation_is_401() {
        let handler = Synthesizer(Speaker);
        let (message, ctx, _rx) = request(MethodName::Pause);
        let terminal = handler.handle(message, ctx).await.unwrap();
        assert_eq!(terminal.status(), Some(StatusCode::MethodNotAllowed));
        assert!(terminal.is_terminal());
    }

    #[tokio::test]
    async fn test_foreign_method_is_401() {
        let handler = Synthesizer(Speaker);
        for method in [MethodName::Recognize, MethodName::Other("X-CUSTOM".into())] {
            let (message, ctx, _rx) = request(method);
            let terminal = handler.handle(message, ctx).await.unwrap();
            assert_eq!(terminal.status(), Some(StatusCode::MethodNotAllowed));
        }
    }
}
