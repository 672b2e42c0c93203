use k8s_util::apis::{Apis, ClusterReader};

pub fn namespace(apis: &Apis) {
    println!("{}", apis.namespace());
}
