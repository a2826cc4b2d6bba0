pub mod coupon;
pub mod coupon_usage;
pub mod order;
pub mod payment;
pub mod route;
pub mod route_stop;
pub mod seat;
pub mod ticket;
pub mod trip;

pub use coupon::CouponType;
pub use order::OrderStatus;
pub use payment::PaymentStatus;
pub use seat::SeatStatus;
pub use ticket::TicketStatus;
pub use trip::TripStatus;
