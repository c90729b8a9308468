//! Integration tests for the checkout workflows.
//!
//! Runs the order and payment services against the in-memory store with a
//! scripted gateway, so every outcome is deterministic.

use std::sync::Arc;
use std::time::Duration;

use checkout::{
    CheckoutError, DECLINED_REASON, GatewayError, OrderLine, OrderService, PaymentService,
    PlaceOrder, ProcessPayment, ScriptedGateway, ScriptedOutcome, TIMEOUT_REASON,
};
use common::{OrderId, ProductId, UserId};
use domain::{
    Category, Money, Order, OrderStatus, PaymentMethod, PaymentStatus, Product, Role, User,
};
use futures_util::future::join_all;
use store::{InMemoryStore, Store, Transaction};

const ADDRESS: &str = "4 Privet Drive, Little Whinging";

struct TestHarness {
    store: InMemoryStore,
    orders: OrderService<InMemoryStore>,
    payments: PaymentService<InMemoryStore, ScriptedGateway>,
    gateway: ScriptedGateway,
    user: User,
    admin: User,
    category: Category,
}

impl TestHarness {
    async fn new() -> Self {
        let store = InMemoryStore::new();
        let gateway = ScriptedGateway::new();

        let user = User::new("harry", "harry@example.com", "hash");
        let admin = User::new("minerva", "minerva@example.com", "hash").with_role(Role::Admin);
        let category = Category::new("Brooms", "brooms");

        let mut tx = store.begin().await.unwrap();
        tx.insert_user(&user).await.unwrap();
        tx.insert_user(&admin).await.unwrap();
        tx.insert_category(&category).await.unwrap();
        tx.commit().await.unwrap();

        Self {
            orders: OrderService::new(store.clone()),
            payments: PaymentService::new(store.clone(), gateway.clone()),
            store,
            gateway,
            user,
            admin,
            category,
        }
    }

    async fn add_product(&self, name: &str, price_cents: i64, stock: u32) -> Product {
        let product = Product::new(self.category.id, name, Money::from_cents(price_cents), stock);
        self.insert_product(&product).await;
        product
    }

    async fn insert_product(&self, product: &Product) {
        let mut tx = self.store.begin().await.unwrap();
        tx.insert_product(product).await.unwrap();
        tx.commit().await.unwrap();
    }

    async fn add_user(&self, user: &User) {
        let mut tx = self.store.begin().await.unwrap();
        tx.insert_user(user).await.unwrap();
        tx.commit().await.unwrap();
    }

    async fn stock(&self, product_id: ProductId) -> u32 {
        let mut tx = self.store.begin().await.unwrap();
        tx.find_product(product_id)
            .await
            .unwrap()
            .unwrap()
            .stock_quantity
    }

    async fn order_status(&self, order_id: OrderId) -> OrderStatus {
        let mut tx = self.store.begin().await.unwrap();
        tx.find_order(order_id).await.unwrap().unwrap().status()
    }

    fn request(&self, lines: &[(ProductId, u32)]) -> PlaceOrder {
        PlaceOrder::new(
            self.user.id,
            ADDRESS,
            lines
                .iter()
                .map(|&(product_id, quantity)| OrderLine::new(product_id, quantity))
                .collect(),
        )
    }

    async fn place(&self, lines: &[(ProductId, u32)]) -> Order {
        self.orders.place_order(self.request(lines)).await.unwrap()
    }

    fn pay(&self, order_id: OrderId, method: PaymentMethod) -> ProcessPayment {
        ProcessPayment::new(order_id, self.user.id, method)
    }
}

mod order_placement {
    use super::*;

    #[tokio::test]
    async fn places_order_and_takes_stock() {
        let h = TestHarness::new().await;
        let broom = h.add_product("Nimbus 2000", 1000, 5).await;
        let gloves = h.add_product("Quidditch Gloves", 250, 10).await;

        let order = h
            .orders
            .place_order(h.request(&[(broom.id, 2), (gloves.id, 4)]).with_notes("fragile"))
            .await
            .unwrap();

        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.user_id(), h.user.id);
        assert_eq!(order.item_count(), 2);
        assert_eq!(order.total_amount(), Money::from_cents(2000 + 1000));
        assert_eq!(order.notes(), Some("fragile"));

        assert_eq!(h.stock(broom.id).await, 3);
        assert_eq!(h.stock(gloves.id).await, 6);
        assert_eq!(h.store.order_count().await, 1);
    }

    #[tokio::test]
    async fn insufficient_stock_leaves_stock_unchanged() {
        let h = TestHarness::new().await;
        let broom = h.add_product("Nimbus 2000", 1000, 5).await;

        let err = h
            .orders
            .place_order(h.request(&[(broom.id, 6)]))
            .await
            .unwrap_err();

        match err {
            CheckoutError::InsufficientStock {
                product_id,
                available,
                requested,
                ..
            } => {
                assert_eq!(product_id, broom.id);
                assert_eq!(available, 5);
                assert_eq!(requested, 6);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }
        assert_eq!(h.stock(broom.id).await, 5);
        assert_eq!(h.store.order_count().await, 0);
    }

    #[tokio::test]
    async fn duplicate_lines_are_checked_sequentially() {
        let h = TestHarness::new().await;
        let broom = h.add_product("Nimbus 2000", 1000, 5).await;

        let order = h.place(&[(broom.id, 3), (broom.id, 2)]).await;

        assert_eq!(order.item_count(), 2);
        assert_eq!(order.total_amount(), Money::from_cents(3 * 1000 + 2 * 1000));
        assert_eq!(h.stock(broom.id).await, 0);
    }

    #[tokio::test]
    async fn duplicate_lines_exceeding_stock_roll_back() {
        let h = TestHarness::new().await;
        let broom = h.add_product("Nimbus 2000", 1000, 5).await;

        let err = h
            .orders
            .place_order(h.request(&[(broom.id, 3), (broom.id, 3)]))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CheckoutError::InsufficientStock {
                available: 2,
                requested: 3,
                ..
            }
        ));
        assert_eq!(h.stock(broom.id).await, 5);
    }

    #[tokio::test]
    async fn failing_line_rolls_back_earlier_lines() {
        let h = TestHarness::new().await;
        let broom = h.add_product("Nimbus 2000", 1000, 5).await;
        let snitch = h.add_product("Golden Snitch", 5000, 1).await;

        let result = h
            .orders
            .place_order(h.request(&[(broom.id, 2), (snitch.id, 2)]))
            .await;

        assert!(matches!(
            result,
            Err(CheckoutError::InsufficientStock { .. })
        ));
        assert_eq!(h.stock(broom.id).await, 5);
        assert_eq!(h.stock(snitch.id).await, 1);
        assert_eq!(h.store.order_count().await, 0);
    }

    #[tokio::test]
    async fn inactive_product_is_rejected() {
        let h = TestHarness::new().await;
        let retired = Product::new(h.category.id, "Cleansweep One", Money::from_cents(500), 9)
            .deactivated();
        h.insert_product(&retired).await;

        let err = h
            .orders
            .place_order(h.request(&[(retired.id, 1)]))
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::InvalidState(_)));
        assert_eq!(h.stock(retired.id).await, 9);
    }

    #[tokio::test]
    async fn unknown_product_and_user_are_not_found() {
        let h = TestHarness::new().await;
        let broom = h.add_product("Nimbus 2000", 1000, 5).await;

        let err = h
            .orders
            .place_order(h.request(&[(ProductId::new(), 1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::NotFound(_)));

        let stranger = PlaceOrder::new(UserId::new(), ADDRESS, vec![OrderLine::new(broom.id, 1)]);
        let err = h.orders.place_order(stranger).await.unwrap_err();
        assert!(matches!(err, CheckoutError::NotFound(_)));
    }

    #[tokio::test]
    async fn inactive_user_cannot_order() {
        let h = TestHarness::new().await;
        let broom = h.add_product("Nimbus 2000", 1000, 5).await;
        let mut banned = User::new("draco", "draco@example.com", "hash");
        banned.availability = domain::Availability::Inactive;
        h.add_user(&banned).await;

        let request = PlaceOrder::new(banned.id, ADDRESS, vec![OrderLine::new(broom.id, 1)]);
        let err = h.orders.place_order(request).await.unwrap_err();

        assert!(matches!(err, CheckoutError::InvalidState(_)));
        assert_eq!(h.stock(broom.id).await, 5);
    }

    #[tokio::test]
    async fn invalid_request_is_rejected_before_touching_the_store() {
        let h = TestHarness::new().await;
        let broom = h.add_product("Nimbus 2000", 1000, 5).await;

        let err = h.orders.place_order(h.request(&[])).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Validation(_)));

        let short = PlaceOrder::new(h.user.id, "Hogwarts", vec![OrderLine::new(broom.id, 1)]);
        let err = h.orders.place_order(short).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Validation(_)));
    }

    #[tokio::test]
    async fn failed_commit_keeps_stock() {
        let h = TestHarness::new().await;
        let broom = h.add_product("Nimbus 2000", 1000, 5).await;

        h.store.set_fail_on_commit(true);
        let err = h
            .orders
            .place_order(h.request(&[(broom.id, 2)]))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::Store(_)));

        h.store.set_fail_on_commit(false);
        assert_eq!(h.stock(broom.id).await, 5);
        assert_eq!(h.store.order_count().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_placements_never_oversell() {
        let h = TestHarness::new().await;
        let last_one = h.add_product("Elder Wand", 99_900, 1).await;
        let service = Arc::new(OrderService::new(h.store.clone()));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let service = Arc::clone(&service);
                let request = h.request(&[(last_one.id, 1)]);
                tokio::spawn(async move { service.place_order(request).await })
            })
            .collect();

        let results: Vec<_> = join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        let placed = results.iter().filter(|r| r.is_ok()).count();
        let short = results
            .iter()
            .filter(|r| matches!(r, Err(CheckoutError::InsufficientStock { available: 0, .. })))
            .count();

        assert_eq!(placed, 1);
        assert_eq!(short, 15);
        assert_eq!(h.stock(last_one.id).await, 0);
        assert_eq!(h.store.order_count().await, 1);
    }
}

mod order_queries_and_cancellation {
    use super::*;

    #[tokio::test]
    async fn owner_can_read_and_list_orders() {
        let h = TestHarness::new().await;
        let broom = h.add_product("Nimbus 2000", 1000, 5).await;
        let first = h.place(&[(broom.id, 1)]).await;
        let second = h.place(&[(broom.id, 1)]).await;

        let found = h.orders.get_order(first.id(), h.user.id).await.unwrap();
        assert_eq!(found, first);

        let ids: Vec<_> = h
            .orders
            .list_orders(h.user.id)
            .await
            .unwrap()
            .iter()
            .map(Order::id)
            .collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&first.id()));
        assert!(ids.contains(&second.id()));
    }

    #[tokio::test]
    async fn other_users_orders_are_not_found() {
        let h = TestHarness::new().await;
        let broom = h.add_product("Nimbus 2000", 1000, 5).await;
        let order = h.place(&[(broom.id, 2)]).await;
        let intruder = User::new("peeves", "peeves@example.com", "hash");
        h.add_user(&intruder).await;

        let read = h.orders.get_order(order.id(), intruder.id).await.unwrap_err();
        let missing = h
            .orders
            .get_order(OrderId::new(), intruder.id)
            .await
            .unwrap_err();
        assert!(matches!(read, CheckoutError::NotFound(_)));
        assert!(matches!(missing, CheckoutError::NotFound(_)));

        let cancel = h
            .orders
            .cancel_order(order.id(), intruder.id)
            .await
            .unwrap_err();
        assert!(matches!(cancel, CheckoutError::NotFound(_)));

        let pay = h
            .payments
            .process_payment(ProcessPayment::new(order.id(), intruder.id, PaymentMethod::Upi))
            .await
            .unwrap_err();
        assert!(matches!(pay, CheckoutError::NotFound(_)));

        assert_eq!(h.stock(broom.id).await, 3);
        assert_eq!(h.order_status(order.id()).await, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn cancel_restores_stock() {
        let h = TestHarness::new().await;
        let broom = h.add_product("Nimbus 2000", 1000, 5).await;
        let order = h.place(&[(broom.id, 3), (broom.id, 1)]).await;
        assert_eq!(h.stock(broom.id).await, 1);

        let cancelled = h.orders.cancel_order(order.id(), h.user.id).await.unwrap();

        assert_eq!(cancelled.status(), OrderStatus::Cancelled);
        assert_eq!(h.stock(broom.id).await, 5);
    }

    #[tokio::test]
    async fn cancelling_twice_fails_without_restoring() {
        let h = TestHarness::new().await;
        let broom = h.add_product("Nimbus 2000", 1000, 5).await;
        let order = h.place(&[(broom.id, 2)]).await;
        h.orders.cancel_order(order.id(), h.user.id).await.unwrap();

        let err = h
            .orders
            .cancel_order(order.id(), h.user.id)
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::InvalidState(_)));
        assert_eq!(h.stock(broom.id).await, 5);
    }

    #[tokio::test]
    async fn delivered_order_cannot_be_cancelled() {
        let h = TestHarness::new().await;
        let broom = h.add_product("Nimbus 2000", 1000, 5).await;
        let order = h.place(&[(broom.id, 2)]).await;
        h.payments
            .process_payment(h.pay(order.id(), PaymentMethod::CreditCard))
            .await
            .unwrap();
        for status in [
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ] {
            h.orders
                .update_order_status(h.admin.id, order.id(), status)
                .await
                .unwrap();
        }

        let err = h
            .orders
            .cancel_order(order.id(), h.user.id)
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::InvalidState(_)));
        assert_eq!(h.stock(broom.id).await, 3);
        assert_eq!(h.order_status(order.id()).await, OrderStatus::Delivered);
    }

    #[tokio::test]
    async fn confirmed_order_can_be_cancelled() {
        let h = TestHarness::new().await;
        let broom = h.add_product("Nimbus 2000", 1000, 5).await;
        let order = h.place(&[(broom.id, 2)]).await;
        h.payments
            .process_payment(h.pay(order.id(), PaymentMethod::Wallet))
            .await
            .unwrap();

        h.orders.cancel_order(order.id(), h.user.id).await.unwrap();

        assert_eq!(h.order_status(order.id()).await, OrderStatus::Cancelled);
        assert_eq!(h.stock(broom.id).await, 5);
    }
}

mod administration {
    use super::*;

    #[tokio::test]
    async fn non_admin_is_forbidden() {
        let h = TestHarness::new().await;
        let broom = h.add_product("Nimbus 2000", 1000, 5).await;
        let order = h.place(&[(broom.id, 1)]).await;

        assert!(matches!(
            h.orders.list_all_orders(h.user.id).await,
            Err(CheckoutError::Forbidden)
        ));
        assert!(matches!(
            h.orders
                .list_orders_by_status(h.user.id, OrderStatus::Pending)
                .await,
            Err(CheckoutError::Forbidden)
        ));
        assert!(matches!(
            h.orders
                .update_order_status(h.user.id, order.id(), OrderStatus::Cancelled)
                .await,
            Err(CheckoutError::Forbidden)
        ));
        assert_eq!(h.stock(broom.id).await, 4);
    }

    #[tokio::test]
    async fn admin_lists_orders() {
        let h = TestHarness::new().await;
        let broom = h.add_product("Nimbus 2000", 1000, 5).await;
        let paid = h.place(&[(broom.id, 1)]).await;
        h.place(&[(broom.id, 1)]).await;
        h.payments
            .process_payment(h.pay(paid.id(), PaymentMethod::CashOnDelivery))
            .await
            .unwrap();

        assert_eq!(h.orders.list_all_orders(h.admin.id).await.unwrap().len(), 2);

        let confirmed = h
            .orders
            .list_orders_by_status(h.admin.id, OrderStatus::Confirmed)
            .await
            .unwrap();
        assert_eq!(confirmed.len(), 1);
        assert_eq!(confirmed[0].id(), paid.id());
    }

    #[tokio::test]
    async fn admin_cancellation_restores_stock() {
        let h = TestHarness::new().await;
        let broom = h.add_product("Nimbus 2000", 1000, 5).await;
        let order = h.place(&[(broom.id, 4)]).await;

        let updated = h
            .orders
            .update_order_status(h.admin.id, order.id(), OrderStatus::Cancelled)
            .await
            .unwrap();

        assert_eq!(updated.status(), OrderStatus::Cancelled);
        assert_eq!(h.stock(broom.id).await, 5);
    }

    #[tokio::test]
    async fn illegal_transition_is_invalid_state() {
        let h = TestHarness::new().await;
        let broom = h.add_product("Nimbus 2000", 1000, 5).await;
        let order = h.place(&[(broom.id, 1)]).await;

        let err = h
            .orders
            .update_order_status(h.admin.id, order.id(), OrderStatus::Shipped)
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::InvalidState(_)));
        assert_eq!(h.order_status(order.id()).await, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn admin_cannot_confirm_unpaid_order() {
        let h = TestHarness::new().await;
        let broom = h.add_product("Nimbus 2000", 1000, 5).await;
        let order = h.place(&[(broom.id, 1)]).await;

        let err = h
            .orders
            .update_order_status(h.admin.id, order.id(), OrderStatus::Confirmed)
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::InvalidState(_)));
        assert_eq!(h.order_status(order.id()).await, OrderStatus::Pending);
        assert_eq!(h.store.payment_count().await, 0);
    }
}

mod payment_settlement {
    use super::*;

    #[tokio::test]
    async fn approved_payment_confirms_order() {
        let h = TestHarness::new().await;
        let broom = h.add_product("Nimbus 2000", 1000, 5).await;
        let order = h.place(&[(broom.id, 2)]).await;

        let payment = h
            .payments
            .process_payment(h.pay(order.id(), PaymentMethod::CreditCard))
            .await
            .unwrap();

        assert_eq!(payment.status(), PaymentStatus::Success);
        assert_eq!(payment.amount(), Money::from_cents(2000));
        assert!(!payment.transaction_id().unwrap_or_default().is_empty());
        assert!(payment.gateway_reference().is_some());
        assert_eq!(h.order_status(order.id()).await, OrderStatus::Confirmed);
        assert_eq!(h.stock(broom.id).await, 3);

        let calls = h.gateway.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].order_id, order.id());
        assert_eq!(calls[0].method, PaymentMethod::CreditCard);
    }

    #[tokio::test]
    async fn declined_payment_cancels_order_and_restores_stock() {
        let h = TestHarness::new().await;
        let broom = h.add_product("Nimbus 2000", 1000, 5).await;
        let gloves = h.add_product("Quidditch Gloves", 250, 10).await;
        let order = h.place(&[(broom.id, 2), (gloves.id, 3)]).await;
        h.gateway.push(ScriptedOutcome::Decline(None));

        let payment = h
            .payments
            .process_payment(h.pay(order.id(), PaymentMethod::NetBanking))
            .await
            .unwrap();

        assert_eq!(payment.status(), PaymentStatus::Failed);
        assert_eq!(payment.failure_reason(), Some(DECLINED_REASON));
        assert_eq!(h.order_status(order.id()).await, OrderStatus::Cancelled);
        assert_eq!(h.stock(broom.id).await, 5);
        assert_eq!(h.stock(gloves.id).await, 10);
    }

    #[tokio::test]
    async fn gateway_reason_is_kept() {
        let h = TestHarness::new().await;
        let broom = h.add_product("Nimbus 2000", 1000, 5).await;
        let order = h.place(&[(broom.id, 1)]).await;
        h.gateway
            .push(ScriptedOutcome::Decline(Some("Card expired".into())));

        let payment = h
            .payments
            .process_payment(h.pay(order.id(), PaymentMethod::DebitCard))
            .await
            .unwrap();

        assert_eq!(payment.failure_reason(), Some("Card expired"));
        assert!(payment.transaction_id().is_some());
    }

    #[tokio::test]
    async fn gateway_error_fails_payment() {
        let h = TestHarness::new().await;
        let broom = h.add_product("Nimbus 2000", 1000, 5).await;
        let order = h.place(&[(broom.id, 2)]).await;
        h.gateway.push(ScriptedOutcome::Fail(GatewayError::Unavailable(
            "503 from upstream".into(),
        )));

        let payment = h
            .payments
            .process_payment(h.pay(order.id(), PaymentMethod::Upi))
            .await
            .unwrap();

        assert_eq!(payment.status(), PaymentStatus::Failed);
        assert!(
            payment
                .failure_reason()
                .unwrap_or_default()
                .contains("503 from upstream")
        );
        assert_eq!(h.order_status(order.id()).await, OrderStatus::Cancelled);
        assert_eq!(h.stock(broom.id).await, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_gateway_times_out() {
        let h = TestHarness::new().await;
        let broom = h.add_product("Nimbus 2000", 1000, 5).await;
        let order = h.place(&[(broom.id, 2)]).await;
        h.gateway.set_delay(Duration::from_secs(30));
        let payments = PaymentService::new(h.store.clone(), h.gateway.clone())
            .with_gateway_timeout(Duration::from_secs(5));

        let payment = payments
            .process_payment(h.pay(order.id(), PaymentMethod::Wallet))
            .await
            .unwrap();

        assert_eq!(payment.status(), PaymentStatus::Failed);
        assert_eq!(payment.failure_reason(), Some(TIMEOUT_REASON));
        assert_eq!(h.order_status(order.id()).await, OrderStatus::Cancelled);
        assert_eq!(h.stock(broom.id).await, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn store_stays_available_while_gateway_is_busy() {
        let h = TestHarness::new().await;
        let broom = h.add_product("Nimbus 2000", 1000, 5).await;
        let order = h.place(&[(broom.id, 1)]).await;
        let neighbour = User::new("luna", "luna@example.com", "hash");
        h.add_user(&neighbour).await;
        h.gateway.set_delay(Duration::from_secs(5));

        let payments = Arc::new(PaymentService::new(h.store.clone(), h.gateway.clone()));
        let in_flight = {
            let payments = Arc::clone(&payments);
            let request = h.pay(order.id(), PaymentMethod::CreditCard);
            tokio::spawn(async move { payments.process_payment(request).await })
        };
        while h.store.payment_count().await == 0 {
            tokio::task::yield_now().await;
        }

        let started = tokio::time::Instant::now();
        let listed = h.orders.list_orders(neighbour.id).await.unwrap();
        assert!(listed.is_empty());
        assert!(started.elapsed() < Duration::from_secs(1));

        // A second payment for the same order is refused while the first waits.
        let err = h
            .payments
            .process_payment(h.pay(order.id(), PaymentMethod::Upi))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::DuplicatePayment(_)));

        let payment = in_flight.await.unwrap().unwrap();
        assert_eq!(payment.status(), PaymentStatus::Success);
        assert_eq!(h.order_status(order.id()).await, OrderStatus::Confirmed);
        assert_eq!(h.gateway.call_count(), 1);
    }

    #[tokio::test]
    async fn only_pending_orders_can_be_paid() {
        let h = TestHarness::new().await;
        let broom = h.add_product("Nimbus 2000", 1000, 5).await;
        let order = h.place(&[(broom.id, 1)]).await;
        h.orders.cancel_order(order.id(), h.user.id).await.unwrap();

        let err = h
            .payments
            .process_payment(h.pay(order.id(), PaymentMethod::Upi))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CheckoutError::InvalidPaymentState {
                status: OrderStatus::Cancelled
            }
        ));
        assert_eq!(h.gateway.call_count(), 0);
        assert_eq!(h.store.payment_count().await, 0);
    }

    #[tokio::test]
    async fn second_payment_is_duplicate() {
        let h = TestHarness::new().await;
        let broom = h.add_product("Nimbus 2000", 1000, 5).await;
        let order = h.place(&[(broom.id, 1)]).await;
        h.gateway.push(ScriptedOutcome::Pending);

        let first = h
            .payments
            .process_payment(h.pay(order.id(), PaymentMethod::Upi))
            .await
            .unwrap();
        assert_eq!(first.status(), PaymentStatus::Processing);

        let err = h
            .payments
            .process_payment(h.pay(order.id(), PaymentMethod::Wallet))
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::DuplicatePayment(id) if id == order.id()));
        assert_eq!(h.gateway.call_count(), 1);
        assert_eq!(h.store.payment_count().await, 1);
        assert_eq!(h.order_status(order.id()).await, OrderStatus::Pending);

        let stored = h
            .payments
            .get_payment_for_order(order.id(), h.user.id)
            .await
            .unwrap();
        assert_eq!(stored.id(), first.id());
        assert_eq!(stored.method(), PaymentMethod::Upi);
    }

    #[tokio::test]
    async fn payment_lookup_requires_ownership() {
        let h = TestHarness::new().await;
        let broom = h.add_product("Nimbus 2000", 1000, 5).await;
        let order = h.place(&[(broom.id, 1)]).await;

        let missing = h
            .payments
            .get_payment_for_order(order.id(), h.user.id)
            .await
            .unwrap_err();
        assert!(matches!(missing, CheckoutError::NotFound(_)));

        h.payments
            .process_payment(h.pay(order.id(), PaymentMethod::CashOnDelivery))
            .await
            .unwrap();
        let foreign = h
            .payments
            .get_payment_for_order(order.id(), h.admin.id)
            .await
            .unwrap_err();
        assert!(matches!(foreign, CheckoutError::NotFound(_)));
    }
}

mod webhook {
    use super::*;

    async fn pending_payment(h: &TestHarness, quantity: u32) -> (Product, Order, String) {
        let broom = h.add_product("Nimbus 2000", 1000, 5).await;
        let order = h.place(&[(broom.id, quantity)]).await;
        h.gateway.push(ScriptedOutcome::Pending);

        let payment = h
            .payments
            .process_payment(h.pay(order.id(), PaymentMethod::NetBanking))
            .await
            .unwrap();
        let transaction_id = payment.transaction_id().unwrap().to_string();
        (broom, order, transaction_id)
    }

    #[tokio::test]
    async fn success_callback_confirms_order() {
        let h = TestHarness::new().await;
        let (broom, order, txn) = pending_payment(&h, 2).await;

        let payment = h.payments.settle_by_transaction(&txn, true).await.unwrap();

        assert_eq!(payment.status(), PaymentStatus::Success);
        assert_eq!(payment.transaction_id(), Some(txn.as_str()));
        assert_eq!(h.order_status(order.id()).await, OrderStatus::Confirmed);
        assert_eq!(h.stock(broom.id).await, 3);
    }

    #[tokio::test]
    async fn failure_callback_cancels_and_restores() {
        let h = TestHarness::new().await;
        let (broom, order, txn) = pending_payment(&h, 4).await;
        assert_eq!(h.stock(broom.id).await, 1);

        let payment = h.payments.settle_by_transaction(&txn, false).await.unwrap();

        assert_eq!(payment.status(), PaymentStatus::Failed);
        assert_eq!(payment.failure_reason(), Some(DECLINED_REASON));
        assert_eq!(h.order_status(order.id()).await, OrderStatus::Cancelled);
        assert_eq!(h.stock(broom.id).await, 5);
    }

    #[tokio::test]
    async fn repeated_callback_changes_nothing() {
        let h = TestHarness::new().await;
        let (broom, order, txn) = pending_payment(&h, 1).await;
        h.payments.settle_by_transaction(&txn, false).await.unwrap();

        let err = h
            .payments
            .settle_by_transaction(&txn, true)
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::InvalidState(_)));
        assert_eq!(h.order_status(order.id()).await, OrderStatus::Cancelled);
        assert_eq!(h.stock(broom.id).await, 5);
    }

    #[tokio::test]
    async fn unknown_transaction_is_not_found() {
        let h = TestHarness::new().await;

        let err = h
            .payments
            .settle_by_transaction("TXN-DEADBEEF", true)
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::NotFound(_)));
    }

    #[tokio::test]
    async fn cancel_waits_for_settlement() {
        let h = TestHarness::new().await;
        let (broom, order, txn) = pending_payment(&h, 2).await;

        let by_customer = h
            .orders
            .cancel_order(order.id(), h.user.id)
            .await
            .unwrap_err();
        let by_admin = h
            .orders
            .update_order_status(h.admin.id, order.id(), OrderStatus::Cancelled)
            .await
            .unwrap_err();

        assert!(matches!(by_customer, CheckoutError::InvalidState(_)));
        assert!(matches!(by_admin, CheckoutError::InvalidState(_)));
        assert_eq!(h.order_status(order.id()).await, OrderStatus::Pending);
        assert_eq!(h.stock(broom.id).await, 3);

        let payment = h.payments.settle_by_transaction(&txn, true).await.unwrap();
        assert_eq!(payment.status(), PaymentStatus::Success);
        assert_eq!(h.order_status(order.id()).await, OrderStatus::Confirmed);
        assert_eq!(h.stock(broom.id).await, 3);
    }
}
