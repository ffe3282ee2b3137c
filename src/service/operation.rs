//! Per-request tasks: [`Operation`] for Search, Modify, Add, Delete, ModifyDN
//! and Compare, and [`BindOperation`] for Bind.
//!
//! Both run their handler under the request's cancellation token. A
//! cancelled request sends nothing. A handler that panics is answered with
//! `operationsError`.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::protocol::dn::Dn;
use crate::protocol::message::{
    decode_delete, response_tag, tags, AddRequest, BindAuth, BindRequest, CompareRequest,
    Control, LdapMessage, LdapResponse, ModifyDnRequest, ModifyRequest, SearchRequest,
    SearchScope,
};
use crate::protocol::result::{LdapError, LdapResult, ResultCode};
use crate::protocol::router::OperationKind;
use crate::service::connection::{FrameWriter, Session, SharedSession};
use crate::service::handler::{DefaultHandler, Handler, RequestContext, SearchSink};
use crate::service::ServerContext;
use crate::utils::metrics::{global_metrics, Timer};

pub(crate) struct Operation {
    pub ctx: Arc<ServerContext>,
    pub writer: FrameWriter,
    pub message: LdapMessage,
    pub session: Session,
    pub peer: String,
    pub token: CancellationToken,
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        String::from("non-string panic payload")
    }
}

impl Operation {
    #[instrument(
        name = "operation",
        skip_all,
        fields(peer = %self.peer, message_id = self.message.message_id, tag = self.message.op_tag())
    )]
    pub(crate) async fn run(self) {
        let Some(response_tag) = response_tag(self.message.op_tag()) else {
            return;
        };
        global_metrics().operation_started();
        let _timer = Timer::start("ldap_operation");

        let outcome = tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            result = AssertUnwindSafe(self.execute()).catch_unwind() => Some(result),
        };

        let response = match outcome {
            None => {
                debug!("Operation cancelled, no response sent");
                return;
            }
            Some(Ok(Ok(response))) => response,
            Some(Ok(Err(e))) => LdapResponse::from(&e),
            Some(Err(panic)) => {
                error!(panic = %panic_message(&*panic), "Handler panicked");
                LdapResponse::from(&LdapError::operations_error("Internal error"))
            }
        };

        if self.token.is_cancelled() {
            debug!("Operation cancelled, no response sent");
            return;
        }
        if !matches!(
            response.code,
            ResultCode::Success | ResultCode::CompareTrue | ResultCode::CompareFalse
        ) {
            global_metrics().operation_failed();
        }
        debug!(result_code = %response.code, "Operation complete");

        let op = response.to_element(response_tag, Vec::new());
        if let Err(e) = self.writer.send(self.message.message_id, op).await {
            debug!(error = %e, "Failed to send response");
        }
    }

    async fn execute(&self) -> LdapResult<LdapResponse> {
        self.ctx.check_controls(&self.message.controls)?;
        let op = &self.message.op;

        match self.message.op_tag() {
            tags::SEARCH_REQUEST => self.search().await,
            tags::MODIFY_REQUEST => {
                let request = ModifyRequest::decode(op)?;
                let (handler, ctx) = self.route(OperationKind::Modify, &request.dn);
                handler.modify(&ctx, &request).await?;
                Ok(LdapResponse::success())
            }
            tags::ADD_REQUEST => {
                let request = AddRequest::decode(op)?;
                let (handler, ctx) = self.route(OperationKind::Add, &request.dn);
                handler.add(&ctx, &request).await?;
                Ok(LdapResponse::success())
            }
            tags::DEL_REQUEST => {
                let dn = decode_delete(op)?;
                let (handler, ctx) = self.route(OperationKind::Delete, &dn);
                handler.delete(&ctx, &dn).await?;
                Ok(LdapResponse::success())
            }
            tags::MODIFY_DN_REQUEST => {
                let request = ModifyDnRequest::decode(op)?;
                let (handler, ctx) = self.route(OperationKind::ModifyDn, &request.dn);
                handler.rename(&ctx, &request).await?;
                Ok(LdapResponse::success())
            }
            tags::COMPARE_REQUEST => {
                let request = CompareRequest::decode(op)?;
                let (handler, ctx) = self.route(OperationKind::Compare, &request.dn);
                let code = if handler.compare(&ctx, &request).await? {
                    ResultCode::CompareTrue
                } else {
                    ResultCode::CompareFalse
                };
                Ok(LdapResponse::with_code(code))
            }
            other => Err(LdapError::protocol_error(format!("Unexpected protocolOp {other}"))),
        }
    }

    async fn search(&self) -> LdapResult<LdapResponse> {
        let request = SearchRequest::decode(&self.message.op, Some(&self.ctx.rules))?;
        let limits = &self.ctx.limits;
        let size_limit = limits.effective_size_limit(request.size_limit);
        let time_limit = limits.effective_time_limit(request.time_limit);

        let mut sink = SearchSink::new(
            self.writer.clone(),
            self.message.message_id,
            size_limit,
            self.token.clone(),
            &request,
        );

        if request.base.is_empty() && request.scope == SearchScope::BaseObject {
            sink.send_if_matches("", &self.ctx.root_dse).await?;
            return Ok(LdapResponse::success());
        }

        debug!(base = %request.base, filter = %request.filter, "Search");
        let (handler, ctx) = self.route(OperationKind::Search, &request.base);
        let result = tokio::time::timeout(time_limit, handler.search(&ctx, &request, &mut sink))
            .await
            .map_err(|_| LdapError::time_limit_exceeded())?;

        if sink.exceeded() {
            return Err(LdapError::size_limit_exceeded());
        }
        result?;
        Ok(LdapResponse::success())
    }

    fn route(&self, kind: OperationKind, dn: &Dn) -> (Arc<dyn Handler>, RequestContext) {
        let mut ctx = RequestContext::new(
            self.message.message_id,
            self.peer.clone(),
            self.token.clone(),
        );
        ctx.bound_dn = self.session.bound_dn.clone();
        ctx.version = self.session.version;
        ctx.controls = self.message.controls.clone();

        let handler: Arc<dyn Handler> = match self.ctx.router.resolve(kind, dn) {
            Some(route) => {
                ctx.params = route.params;
                ctx.pattern = route.pattern;
                route.handler
            }
            None => Arc::new(DefaultHandler),
        };
        (handler, ctx)
    }
}

/// A bind request running off the read loop.
///
/// The new session is stored before the response is written, so a client
/// that waits for the BindResponse always sees its new identity.
pub(crate) struct BindOperation {
    pub ctx: Arc<ServerContext>,
    pub writer: FrameWriter,
    pub session: SharedSession,
    pub message_id: i32,
    pub request: BindRequest,
    pub controls: Vec<Control>,
    pub peer: String,
    pub token: CancellationToken,
}

impl BindOperation {
    #[instrument(name = "bind", skip_all, fields(peer = %self.peer, message_id = self.message_id))]
    pub(crate) async fn run(self) {
        let outcome = tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            result = self.authenticate() => Some(result),
        };
        let Some(result) = outcome else {
            debug!("Bind interrupted, no response sent");
            return;
        };

        let (session, response) = match &result {
            Ok(dn) => {
                info!(dn = %dn, "Bind succeeded");
                let session = Session {
                    bound_dn: (!dn.is_empty()).then(|| dn.clone()),
                    version: self.request.version,
                };
                (session, LdapResponse::success())
            }
            Err(e) => {
                info!(result_code = %e.code, "Bind failed");
                (Session::default(), LdapResponse::from(e))
            }
        };
        *self.session.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = session;
        global_metrics().bind(result.is_ok());

        let op = response.to_element(tags::BIND_RESPONSE, Vec::new());
        if let Err(e) = self.writer.send(self.message_id, op).await {
            debug!(error = %e, "Failed to send bind response");
        }
    }

    async fn authenticate(&self) -> LdapResult<Dn> {
        let password = match &self.request.auth {
            BindAuth::Simple(password) => password,
            BindAuth::Sasl { mechanism, .. } => {
                return Err(LdapError::auth_method_not_supported(format!(
                    "SASL mechanism {mechanism} is not supported"
                )))
            }
        };
        self.ctx.check_controls(&self.controls)?;
        let dn = Dn::parse(&self.request.name)?;

        let mut ctx = RequestContext::new(self.message_id, self.peer.clone(), self.token.clone());
        ctx.controls = self.controls.clone();
        ctx.version = self.request.version;
        let handler: Arc<dyn Handler> = match self.ctx.router.resolve(OperationKind::Bind, &dn) {
            Some(route) => {
                ctx.params = route.params;
                ctx.pattern = route.pattern;
                route.handler
            }
            None => Arc::new(DefaultHandler),
        };

        AssertUnwindSafe(handler.bind(&ctx, self.request.version, &dn, password))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                error!(panic = %panic_message(&*panic), "Bind handler panicked");
                Err(LdapError::operations_error("Internal error"))
            })?;
        Ok(dn)
    }
}
