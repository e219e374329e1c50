/// Empty value, used as the unit payload wherever a tree is a set of
/// keys rather than a map, like the id-sets inside secondary indexes.
#[derive(Copy, Clone, Default, Debug, Eq, PartialEq)]
pub struct Empty;
