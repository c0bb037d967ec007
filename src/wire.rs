use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::stream;
use futures::Sink;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::data::DataRow;
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;

use crate::auth::ParkdAuthSource;
use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::observability;
use crate::payment::PaymentGateway;
use crate::sql::{self, Command};
use crate::tenant::TenantManager;

pub struct ParkdHandler {
    tenant_manager: Arc<TenantManager>,
    gateway: Arc<dyn PaymentGateway>,
    payment_timeout: Duration,
    query_parser: Arc<ParkdQueryParser>,
}

impl ParkdHandler {
    pub fn new(
        tenant_manager: Arc<TenantManager>,
        gateway: Arc<dyn PaymentGateway>,
        payment_timeout: Duration,
    ) -> Self {
        Self {
            tenant_manager,
            gateway,
            payment_timeout,
            query_parser: Arc::new(ParkdQueryParser),
        }
    }

    fn resolve_engine<C: ClientInfo>(&self, client: &C) -> PgWireResult<Arc<Engine>> {
        let db = client
            .metadata()
            .get("database")
            .cloned()
            .unwrap_or_else(|| "default".to_string());
        self.tenant_manager.get_or_create(&db).map_err(|e| {
            PgWireError::UserError(Box::new(ErrorInfo::new(
                "ERROR".into(),
                "08006".into(),
                format!("tenant error: {e}"),
            )))
        })
    }

    async fn execute_command(&self, engine: &Engine, cmd: Command) -> PgWireResult<Vec<Response>> {
        let label = observability::command_label(&cmd);
        let started = Instant::now();
        let result = self.dispatch(engine, cmd).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status)
            .increment(1);
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn dispatch(&self, engine: &Engine, cmd: Command) -> PgWireResult<Vec<Response>> {
        match cmd {
            Command::InsertSpot {
                id,
                name,
                address,
                lat,
                lng,
                rate_cents,
                total_spots,
                zone,
                restrictions,
            } => {
                engine
                    .create_spot(id, name, address, lat, lng, rate_cents, total_spots, zone, restrictions)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::SetAvailability { id, available } => {
                engine.set_available(id, available).await.map_err(engine_err)?;
                let spot = engine.spot(id).await.ok_or_else(|| engine_err(EngineError::NotFound(id)))?;
                Ok(vec![spots_response(vec![spot])])
            }
            Command::DeactivateSpot { id } => {
                engine.deactivate_spot(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::InsertSession {
                plate,
                spot_id,
                duration_min,
                cost_cents,
                paid,
            } => {
                let session = if paid {
                    engine
                        .create_paid_session(
                            self.gateway.as_ref(),
                            self.payment_timeout,
                            &plate,
                            spot_id,
                            duration_min,
                            cost_cents,
                        )
                        .await
                } else {
                    engine.create_session(&plate, spot_id, duration_min, cost_cents).await
                }
                .map_err(engine_err)?;
                Ok(vec![sessions_response(vec![SessionView::at(session, now_ms())])])
            }
            Command::ExtendSession {
                id,
                additional_min,
                additional_cost_cents,
            } => {
                let session = engine
                    .extend_session(id, additional_min, additional_cost_cents)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![sessions_response(vec![SessionView::at(session, now_ms())])])
            }
            Command::CancelSession { id } => {
                let session = engine.cancel_session(id).await.map_err(engine_err)?;
                Ok(vec![sessions_response(vec![SessionView::at(session, now_ms())])])
            }
            Command::InsertPayment {
                plate,
                amount_cents,
                fee_cents,
                charge_ref,
                session_id,
            } => {
                let payment = engine
                    .register_charge(&plate, session_id, amount_cents, fee_cents, charge_ref)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![payments_response(vec![payment])])
            }
            Command::ConfirmCharge { charge_ref, receipt } => {
                let payment = engine
                    .confirm_charge(&charge_ref, receipt)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![payments_response(vec![payment])])
            }
            Command::FailCharge { charge_ref } => {
                let payment = engine.fail_charge(&charge_ref).await.map_err(engine_err)?;
                Ok(vec![payments_response(vec![payment])])
            }
            Command::RefundPayment { id } => {
                let payment = engine
                    .refund_payment(self.gateway.as_ref(), self.payment_timeout, id)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![payments_response(vec![payment])])
            }
            Command::SelectSpots { zone, bbox } => {
                let spots = engine.list_spots(&SpotFilter { zone, bbox }).await;
                Ok(vec![spots_response(spots)])
            }
            Command::SelectSpot { id } => {
                let spot = engine.spot(id).await.ok_or_else(|| engine_err(EngineError::NotFound(id)))?;
                Ok(vec![spots_response(vec![spot])])
            }
            Command::SelectActiveSession { plate } => {
                // Absence is an empty row set, not an error.
                let views = engine
                    .lookup_active(&plate, now_ms())
                    .await
                    .into_iter()
                    .collect();
                Ok(vec![sessions_response(views)])
            }
            Command::SelectSession { id } => {
                let session = engine
                    .session(id)
                    .await
                    .ok_or_else(|| engine_err(EngineError::NotFound(id)))?;
                Ok(vec![sessions_response(vec![SessionView::at(session, now_ms())])])
            }
            Command::SelectSessionHistory { plate, page, per_page } => {
                let page = engine
                    .session_history(&plate, page, per_page, now_ms())
                    .await
                    .map_err(engine_err)?;
                Ok(vec![history_response(page)])
            }
            Command::SelectPayments { plate } => {
                let payments = engine.payments_for_plate(&plate).await.map_err(engine_err)?;
                Ok(vec![payments_response(payments)])
            }
            Command::SelectPayment { id } => {
                let payment = engine
                    .payment(id)
                    .await
                    .ok_or_else(|| engine_err(EngineError::NotFound(id)))?;
                Ok(vec![payments_response(vec![payment])])
            }
            Command::SelectPaymentByChargeRef { charge_ref } => {
                let payment = engine
                    .payment_for_charge(&charge_ref)
                    .await
                    .ok_or_else(|| engine_err(EngineError::UnknownChargeRef(charge_ref)))?;
                Ok(vec![payments_response(vec![payment])])
            }
            Command::SelectStats => {
                let stats = engine.statistics().await;
                Ok(vec![stats_response(stats)])
            }
            Command::SelectPlateStats { plate } => {
                let stats = engine.plate_statistics(&plate).await.map_err(engine_err)?;
                Ok(vec![plate_stats_response(&plate, stats)])
            }
        }
    }
}

// ── Row schemas & encoders ───────────────────────────────────────

fn text_field(name: &str, ty: Type) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, ty, FieldFormat::Text)
}

fn spot_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id", Type::VARCHAR),
        text_field("name", Type::VARCHAR),
        text_field("address", Type::VARCHAR),
        text_field("lat", Type::FLOAT8),
        text_field("lng", Type::FLOAT8),
        text_field("rate_cents", Type::INT8),
        text_field("total_spots", Type::INT8),
        text_field("available_spots", Type::INT8),
        text_field("zone", Type::VARCHAR),
        text_field("restrictions", Type::VARCHAR),
        text_field("active", Type::BOOL),
        text_field("last_updated", Type::INT8),
    ]
}

fn session_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id", Type::VARCHAR),
        text_field("plate", Type::VARCHAR),
        text_field("spot_id", Type::VARCHAR),
        text_field("duration_min", Type::INT8),
        text_field("start", Type::INT8),
        text_field("end", Type::INT8),
        text_field("cost_cents", Type::INT8),
        text_field("fee_paid_cents", Type::INT8),
        text_field("fee_saved_cents", Type::INT8),
        text_field("status", Type::VARCHAR),
        text_field("payment_id", Type::VARCHAR),
        text_field("time_remaining_secs", Type::INT8),
        text_field("is_expired", Type::BOOL),
    ]
}

fn history_schema() -> Vec<FieldInfo> {
    let mut schema = session_schema();
    schema.push(text_field("page", Type::INT8));
    schema.push(text_field("per_page", Type::INT8));
    schema.push(text_field("total", Type::INT8));
    schema.push(text_field("pages", Type::INT8));
    schema
}

fn payment_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id", Type::VARCHAR),
        text_field("session_id", Type::VARCHAR),
        text_field("plate", Type::VARCHAR),
        text_field("amount_cents", Type::INT8),
        text_field("fee_cents", Type::INT8),
        text_field("status", Type::VARCHAR),
        text_field("charge_ref", Type::VARCHAR),
        text_field("receipt", Type::VARCHAR),
    ]
}

fn stats_schema() -> Vec<FieldInfo> {
    vec![
        text_field("total_spots", Type::INT8),
        text_field("available_spots", Type::INT8),
        text_field("active_sessions", Type::INT8),
        text_field("total_revenue_cents", Type::INT8),
        text_field("total_fees_saved_cents", Type::INT8),
        text_field("occupancy_rate", Type::FLOAT8),
    ]
}

fn plate_stats_schema() -> Vec<FieldInfo> {
    vec![
        text_field("plate", Type::VARCHAR),
        text_field("total_sessions", Type::INT8),
        text_field("active_sessions", Type::INT8),
        text_field("total_spent_cents", Type::INT8),
        text_field("total_fees_cents", Type::INT8),
        text_field("total_saved_cents", Type::INT8),
    ]
}

fn encode_spot(schema: Arc<Vec<FieldInfo>>, spot: &Spot) -> PgWireResult<DataRow> {
    let mut encoder = DataRowEncoder::new(schema);
    encoder.encode_field(&spot.id.to_string())?;
    encoder.encode_field(&spot.name)?;
    encoder.encode_field(&spot.address)?;
    encoder.encode_field(&spot.lat)?;
    encoder.encode_field(&spot.lng)?;
    encoder.encode_field(&spot.rate_cents)?;
    encoder.encode_field(&i64::from(spot.total_spots))?;
    encoder.encode_field(&i64::from(spot.available_spots))?;
    encoder.encode_field(&spot.zone)?;
    encoder.encode_field(&serde_json::to_string(&spot.restrictions).unwrap_or_default())?;
    encoder.encode_field(&spot.active)?;
    encoder.encode_field(&spot.last_updated)?;
    Ok(encoder.take_row())
}

fn encode_session(schema: Arc<Vec<FieldInfo>>, view: &SessionView) -> PgWireResult<DataRow> {
    let mut encoder = DataRowEncoder::new(schema);
    encode_session_fields(&mut encoder, view)?;
    Ok(encoder.take_row())
}

fn encode_session_fields(encoder: &mut DataRowEncoder, view: &SessionView) -> PgWireResult<()> {
    let s = &view.session;
    encoder.encode_field(&s.id.to_string())?;
    encoder.encode_field(&s.plate)?;
    encoder.encode_field(&s.spot_id.to_string())?;
    encoder.encode_field(&i64::from(s.duration_min))?;
    encoder.encode_field(&s.start)?;
    encoder.encode_field(&s.end)?;
    encoder.encode_field(&s.cost_cents)?;
    encoder.encode_field(&s.fee_paid_cents)?;
    encoder.encode_field(&s.fee_saved_cents)?;
    encoder.encode_field(&s.status.as_str())?;
    encoder.encode_field(&s.payment_id.map(|id| id.to_string()))?;
    encoder.encode_field(&view.time_remaining_secs)?;
    encoder.encode_field(&view.is_expired)?;
    Ok(())
}

fn encode_payment(schema: Arc<Vec<FieldInfo>>, payment: &Payment) -> PgWireResult<DataRow> {
    let mut encoder = DataRowEncoder::new(schema);
    encoder.encode_field(&payment.id.to_string())?;
    encoder.encode_field(&payment.session_id.map(|id| id.to_string()))?;
    encoder.encode_field(&payment.plate)?;
    encoder.encode_field(&payment.amount_cents)?;
    encoder.encode_field(&payment.fee_cents)?;
    encoder.encode_field(&payment.status.as_str())?;
    encoder.encode_field(&payment.charge_ref)?;
    encoder.encode_field(&payment.receipt)?;
    Ok(encoder.take_row())
}

fn spots_response(spots: Vec<Spot>) -> Response {
    let schema = Arc::new(spot_schema());
    let rows: Vec<PgWireResult<DataRow>> = spots
        .iter()
        .map(|spot| encode_spot(schema.clone(), spot))
        .collect();
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

fn sessions_response(views: Vec<SessionView>) -> Response {
    let schema = Arc::new(session_schema());
    let rows: Vec<PgWireResult<DataRow>> = views
        .iter()
        .map(|view| encode_session(schema.clone(), view))
        .collect();
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

fn history_response(page: Page<SessionView>) -> Response {
    let schema = Arc::new(history_schema());
    let rows: Vec<PgWireResult<DataRow>> = page
        .items
        .iter()
        .map(|view| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encode_session_fields(&mut encoder, view)?;
            encoder.encode_field(&i64::from(page.page))?;
            encoder.encode_field(&i64::from(page.per_page))?;
            encoder.encode_field(&(page.total as i64))?;
            encoder.encode_field(&i64::from(page.pages))?;
            Ok(encoder.take_row())
        })
        .collect();
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

fn payments_response(payments: Vec<Payment>) -> Response {
    let schema = Arc::new(payment_schema());
    let rows: Vec<PgWireResult<DataRow>> = payments
        .iter()
        .map(|payment| encode_payment(schema.clone(), payment))
        .collect();
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

fn stats_response(stats: Stats) -> Response {
    let schema = Arc::new(stats_schema());
    let row: PgWireResult<DataRow> = (|| {
        let mut encoder = DataRowEncoder::new(schema.clone());
        encoder.encode_field(&(stats.total_spots as i64))?;
        encoder.encode_field(&(stats.available_spots as i64))?;
        encoder.encode_field(&(stats.active_sessions as i64))?;
        encoder.encode_field(&stats.total_revenue_cents)?;
        encoder.encode_field(&stats.total_fees_saved_cents)?;
        encoder.encode_field(&stats.occupancy_rate)?;
        Ok(encoder.take_row())
    })();
    Response::Query(QueryResponse::new(schema, stream::iter(vec![row])))
}

fn plate_stats_response(plate: &str, stats: PlateStats) -> Response {
    let schema = Arc::new(plate_stats_schema());
    let plate = plate.to_string();
    let row: PgWireResult<DataRow> = (|| {
        let mut encoder = DataRowEncoder::new(schema.clone());
        encoder.encode_field(&plate)?;
        encoder.encode_field(&(stats.total_sessions as i64))?;
        encoder.encode_field(&(stats.active_sessions as i64))?;
        encoder.encode_field(&stats.total_spent_cents)?;
        encoder.encode_field(&stats.total_fees_cents)?;
        encoder.encode_field(&stats.total_saved_cents)?;
        Ok(encoder.take_row())
    })();
    Response::Query(QueryResponse::new(schema, stream::iter(vec![row])))
}

/// Best-effort schema guess for Describe, keyed off table keywords. The
/// dialect is small enough that substring checks are unambiguous.
fn select_schema(sql: &str) -> Vec<FieldInfo> {
    let upper = sql.to_uppercase();
    if !upper.contains("SELECT") {
        return vec![];
    }
    if upper.contains("SPOTS") {
        spot_schema()
    } else if upper.contains("SESSIONS") {
        if upper.contains("PAGE") {
            history_schema()
        } else {
            session_schema()
        }
    } else if upper.contains("PAYMENTS") {
        payment_schema()
    } else if upper.contains("STATS") {
        if upper.contains("PLATE") {
            plate_stats_schema()
        } else {
            stats_schema()
        }
    } else {
        vec![]
    }
}

#[async_trait]
impl SimpleQueryHandler for ParkdHandler {
    async fn do_query<C>(&self, client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        self.execute_command(&engine, cmd).await
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct ParkdQueryParser;

#[async_trait]
impl QueryParser for ParkdQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(select_schema(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for ParkdHandler {
    type Statement = String;
    type QueryParser = ParkdQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        let sql = substitute_params(portal);
        let cmd = sql::parse_sql(&sql).map_err(sql_err)?;
        let mut responses = self.execute_command(&engine, cmd).await?;
        Ok(responses.remove(0))
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            select_schema(&target.statement),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(select_schema(
            &target.statement.statement,
        )))
    }
}

/// Count the highest $N parameter placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let mut max = 0usize;
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            i += 1;
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i > start {
                if let Ok(n) = sql[start..i].parse::<usize>() {
                    if n > max {
                        max = n;
                    }
                }
            }
        } else {
            i += 1;
        }
    }
    max
}

/// Substitute $1, $2, ... placeholders with bound parameter values (text format).
fn substitute_params(portal: &Portal<String>) -> String {
    let sql = portal.statement.statement.to_string();
    let params = &portal.parameters;
    let mut result = sql;

    for (i, param) in params.iter().enumerate().rev() {
        let placeholder = format!("${}", i + 1);
        let value = match param {
            Some(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                format!("'{}'", text.replace('\'', "''"))
            }
            None => "NULL".to_string(),
        };
        result = result.replace(&placeholder, &value);
    }

    result
}

// ── Factory ──────────────────────────────────────────────────────

pub struct ParkdFactory {
    handler: Arc<ParkdHandler>,
    auth_handler:
        Arc<CleartextPasswordAuthStartupHandler<ParkdAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl ParkdFactory {
    pub fn new(
        tenant_manager: Arc<TenantManager>,
        gateway: Arc<dyn PaymentGateway>,
        payment_timeout: Duration,
        password: String,
    ) -> Self {
        let auth_source = ParkdAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(ParkdHandler::new(tenant_manager, gateway, payment_timeout)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for ParkdFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Drive one client connection through the pgwire protocol machinery.
pub async fn process_connection(
    socket: TcpStream,
    tenant_manager: Arc<TenantManager>,
    gateway: Arc<dyn PaymentGateway>,
    payment_timeout: Duration,
    password: String,
    tls: Option<TlsAcceptor>,
) -> std::io::Result<()> {
    let factory = ParkdFactory::new(tenant_manager, gateway, payment_timeout, password);
    pgwire::tokio::process_socket(socket, tls, factory).await
}

fn engine_err(e: EngineError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "P0001".into(),
        e.to_string(),
    )))
}

fn sql_err(e: crate::sql::SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "42601".into(),
        e.to_string(),
    )))
}
