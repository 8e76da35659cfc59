pub mod embeds;
pub mod pager;
