//! A controller driven by hand through the core types, without the runner

use serde::{Deserialize, Serialize};
use serde_json::json;

use ctltest_core::{
    Context, Controller, ControllerBase, Request, SessionManager, StatusCode, receive, reshape,
};

#[derive(Default)]
struct OrderController {
    base: ControllerBase,
}

impl Controller for OrderController {
    fn base(&self) -> &ControllerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ControllerBase {
        &mut self.base
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Order {
    item: String,
    quantity: u32,
}

impl OrderController {
    fn create(&mut self) {
        let ctx = self.base.ctx_mut().expect("initialized");
        let order: Order = match ctx.input.json() {
            Ok(order) => order,
            Err(_) => {
                ctx.output.error("bad order", StatusCode::BAD_REQUEST);
                return;
            }
        };
        ctx.output.write_header(StatusCode::CREATED);
        self.base.set_json(json!({"item": order.item, "quantity": order.quantity}));
    }
}

fn posted(body: &serde_json::Value) -> Context {
    let request = Request::post("/orders").unwrap().with_json(body).unwrap();
    let mut ctx = Context::new(request);
    ctx.input.copy_body(usize::MAX);
    ctx
}

#[test]
fn json_order_round_trip() {
    let mut controller = OrderController::default();
    controller.init(posted(&json!({"item": "tea", "quantity": 3})), "OrderController", "Create");
    controller.create();

    let output = controller.base().json().unwrap();
    let order: Order = reshape(output).unwrap();
    assert_eq!(
        order,
        Order {
            item: "tea".into(),
            quantity: 3
        }
    );
    let status = controller.base().ctx().unwrap().output.status();
    assert_eq!(status, StatusCode::CREATED);
}

#[test]
fn bad_body_writes_400_and_no_output() {
    let mut controller = OrderController::default();
    controller.init(posted(&json!({"item": 7})), "OrderController", "Create");
    controller.create();

    assert!(controller.base().json().is_none());
    let output = &controller.base().ctx().unwrap().output;
    assert_eq!(output.status(), StatusCode::BAD_REQUEST);
    assert_eq!(output.text(), "bad order\n");
}

#[test]
fn receive_leaves_target_when_shapes_differ() {
    let mut order = Order {
        item: "kept".into(),
        quantity: 1,
    };
    receive(&json!({"item": "tea"}), &mut order);
    assert_eq!(order.item, "kept");
}

#[test]
fn session_survives_reinit() {
    let sessions = SessionManager::memory("sid");
    let mut controller = OrderController::default();
    controller.base_mut().attach_session(sessions.regenerate_id());
    controller.set_session("cart", json!(["tea"]));

    controller.init(Context::blank(), "OrderController", "List");
    let session = controller.base().ctx().unwrap().input.session().unwrap();
    assert_eq!(session.get("cart"), Some(json!(["tea"])));
    assert_eq!(sessions.active_sessions(), 1);
}
