//! Ledger-backed simulated execution. Orders become `open` trade rows with a
//! generated ticket; closes price against the live spot and write the P&L
//! back. The default provider.

use chrono::Utc;
use rand::Rng;
use std::sync::Arc;

use super::{
    AccountSummary, CloseOutcome, ExecutionOutcome, ExecutionProvider, OpenPosition, OrderRequest,
    ServerTime,
};
use crate::data::market::MarketDataClient;
use crate::data::store::{Store, TradeRecord, TradeStatus};
use crate::data::Side;
use crate::error::EngineError;

/// Balance reported when no account record is on file.
const DEFAULT_BALANCE: f64 = 10_000.0;

/// Contract multiplier: $100 of P&L per lot per dollar of price movement.
const PL_PER_LOT_PER_DOLLAR: f64 = 100.0;

pub struct SimulatedProvider {
    store: Arc<Store>,
    market: Arc<MarketDataClient>,
}

impl SimulatedProvider {
    pub fn new(store: Arc<Store>, market: Arc<MarketDataClient>) -> Self {
        Self { store, market }
    }

    fn new_ticket() -> String {
        let n: u32 = rand::rng().random_range(10_000_000..100_000_000);
        format!("SIM-{n}")
    }
}

pub(crate) fn profit_for(side: Side, open_price: f64, close_price: f64, lot_size: f64) -> f64 {
    let price_diff = match side {
        Side::Buy => close_price - open_price,
        Side::Sell => open_price - close_price,
    };
    price_diff * lot_size * PL_PER_LOT_PER_DOLLAR
}

#[async_trait::async_trait]
impl ExecutionProvider for SimulatedProvider {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn execute_order(&self, order: &OrderRequest) -> Result<ExecutionOutcome, EngineError> {
        if order.lot_size <= 0.0 {
            return Err(EngineError::Validation(format!(
                "lot size must be positive, got {}",
                order.lot_size
            )));
        }
        if order.open_price <= 0.0 {
            return Err(EngineError::Validation(format!(
                "open price must be positive, got {}",
                order.open_price
            )));
        }

        let trade = TradeRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: order.user_id.clone(),
            account_id: order.account_id.clone(),
            session_id: order.session_id.clone(),
            ticket: Self::new_ticket(),
            symbol: order.symbol.clone(),
            side: order.side,
            lot_size: order.lot_size,
            open_price: order.open_price,
            stop_loss: order.stop_loss,
            take_profit: order.take_profit,
            close_price: None,
            profit_loss: None,
            status: TradeStatus::Open,
            opened_at: Utc::now(),
            closed_at: None,
        };

        // Session-tagged trades go through the guarded insert so two
        // overlapping runner passes cannot both open for one session.
        if trade.session_id.is_some() {
            if !self.store.insert_session_trade(&trade).await? {
                return Ok(ExecutionOutcome {
                    success: false,
                    trade_id: None,
                    ticket: None,
                    error: Some("session already has an open trade".to_string()),
                });
            }
        } else {
            self.store.insert_trade(&trade).await?;
        }

        tracing::info!(
            trade_id = %trade.id,
            ticket = %trade.ticket,
            side = %trade.side,
            lot = trade.lot_size,
            open_price = trade.open_price,
            "simulated order executed"
        );

        Ok(ExecutionOutcome {
            success: true,
            trade_id: Some(trade.id),
            ticket: Some(trade.ticket),
            error: None,
        })
    }

    async fn close_order(
        &self,
        ticket: &str,
        lots: Option<f64>,
    ) -> Result<CloseOutcome, EngineError> {
        let Some(trade) = self.store.find_trade(ticket).await? else {
            return Err(EngineError::provider(
                "close_order",
                format!("no trade found for {ticket}"),
            ));
        };
        if trade.status != TradeStatus::Open {
            return Err(EngineError::provider(
                "close_order",
                format!("trade {ticket} is already closed"),
            ));
        }
        if let Some(l) = lots {
            if l <= 0.0 || l > trade.lot_size {
                return Err(EngineError::Validation(format!(
                    "close lots must be in (0, {}], got {l}",
                    trade.lot_size
                )));
            }
        }

        let spot = self.market.spot_price().await?;
        let profit = profit_for(trade.side, trade.open_price, spot, trade.lot_size);
        let closed_at = Utc::now();
        self.store
            .close_trade(&trade.id, spot, profit, closed_at)
            .await?;

        tracing::info!(
            trade_id = %trade.id,
            ticket = %trade.ticket,
            close_price = spot,
            profit,
            "simulated order closed"
        );

        Ok(CloseOutcome {
            success: true,
            ticket: trade.ticket,
            close_price: Some(spot),
            profit: Some(profit),
            error: None,
        })
    }

    async fn account_summary(
        &self,
        account_id: Option<&str>,
    ) -> Result<AccountSummary, EngineError> {
        let (balance, currency) = match account_id {
            Some(id) => match self.store.trading_account(id).await? {
                Some(account) => (account.balance, account.currency),
                None => (DEFAULT_BALANCE, "USD".to_string()),
            },
            None => (DEFAULT_BALANCE, "USD".to_string()),
        };
        Ok(AccountSummary {
            balance,
            equity: balance,
            margin: 0.0,
            free_margin: balance,
            currency,
            error: None,
        })
    }

    async fn open_positions(
        &self,
        account_id: Option<&str>,
    ) -> Result<Vec<OpenPosition>, EngineError> {
        let trades = self.store.open_trades(account_id).await?;
        Ok(trades
            .into_iter()
            .map(|t| OpenPosition {
                ticket: t.ticket,
                symbol: t.symbol,
                side: t.side,
                lots: t.lot_size,
                open_price: t.open_price,
                stop_loss: Some(t.stop_loss),
                take_profit: t.take_profit,
                profit: None,
                opened_at: Some(t.opened_at.to_rfc3339()),
            })
            .collect())
    }

    async fn server_time(&self) -> Result<ServerTime, EngineError> {
        Ok(ServerTime {
            time: Utc::now().to_rfc3339(),
            error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spot_body(price: f64) -> serde_json::Value {
        serde_json::json!({
            "Realtime Currency Exchange Rate": { "5. Exchange Rate": price.to_string() }
        })
    }

    async fn mock_spot_server(price: f64) -> String {
        let body = spot_body(price);
        let app = axum::Router::new().route(
            "/query",
            axum::routing::get(move || {
                let body = body.clone();
                async move { axum::Json(body) }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/query")
    }

    async fn provider_with_spot(price: f64) -> (SimulatedProvider, Arc<Store>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.db");
        let store = Arc::new(Store::open(path.to_str().unwrap()).unwrap());
        let url = mock_spot_server(price).await;
        let market = Arc::new(MarketDataClient::new(url, "k").unwrap());
        (SimulatedProvider::new(store.clone(), market), store, dir)
    }

    fn order(side: Side, open_price: f64) -> OrderRequest {
        OrderRequest {
            user_id: "user-1".into(),
            account_id: "acct-1".into(),
            symbol: "XAUUSD".into(),
            side,
            lot_size: 0.05,
            open_price,
            stop_loss: open_price - 10.0,
            take_profit: Some(open_price + 20.0),
            session_id: None,
        }
    }

    #[test]
    fn pl_sign_follows_side() {
        // BUY closed above entry profits; SELL closed above entry loses.
        assert!(profit_for(Side::Buy, 2000.0, 2010.0, 0.01) > 0.0);
        assert!(profit_for(Side::Sell, 2000.0, 2010.0, 0.01) < 0.0);
        assert_eq!(profit_for(Side::Buy, 2000.0, 2000.0, 0.01), 0.0);
        // (2010 − 2000) · 0.05 · 100
        assert_eq!(profit_for(Side::Buy, 2000.0, 2010.0, 0.05), 50.0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn execute_then_close_keeps_ledger_invariants() {
        let (provider, store, _dir) = provider_with_spot(2010.0).await;

        let outcome = provider.execute_order(&order(Side::Buy, 2000.0)).await.unwrap();
        assert!(outcome.success);
        let trade_id = outcome.trade_id.unwrap();
        let ticket = outcome.ticket.unwrap();
        assert!(ticket.starts_with("SIM-"));

        let row = store.find_trade(&trade_id).await.unwrap().unwrap();
        assert_eq!(row.status, TradeStatus::Open);
        assert!(row.close_price.is_none() && row.profit_loss.is_none());

        let closed = provider.close_order(&ticket, None).await.unwrap();
        assert!(closed.success);
        assert_eq!(closed.close_price, Some(2010.0));
        assert_eq!(closed.profit, Some(50.0));

        let row = store.find_trade(&trade_id).await.unwrap().unwrap();
        assert_eq!(row.status, TradeStatus::Closed);
        assert_eq!(row.profit_loss, Some(50.0));
        assert!(row.closed_at.is_some());

        // Double close is a provider failure.
        assert!(provider.close_order(&ticket, None).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn account_summary_defaults_without_a_record() {
        let (provider, _store, _dir) = provider_with_spot(2000.0).await;
        let summary = provider.account_summary(None).await.unwrap();
        assert_eq!(summary.balance, DEFAULT_BALANCE);
        assert_eq!(summary.currency, "USD");
        assert_eq!(summary.free_margin, DEFAULT_BALANCE);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn open_positions_lists_only_open_rows() {
        let (provider, _store, _dir) = provider_with_spot(2005.0).await;
        let a = provider.execute_order(&order(Side::Buy, 2000.0)).await.unwrap();
        provider.execute_order(&order(Side::Sell, 2002.0)).await.unwrap();
        provider
            .close_order(&a.ticket.unwrap(), None)
            .await
            .unwrap();

        let positions = provider.open_positions(None).await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].side, Side::Sell);
    }
}
