mod link;
mod validity;

pub use link::{
    ClickDetail, ClickEvent, CreateLinkRequest, CreateLinkResponse, CreatedLink, LinkRecord,
    LinkStats, LinkStatsResponse, NewLink, Visit,
};
pub use validity::parse_validity;
