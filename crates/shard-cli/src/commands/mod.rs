pub mod ps;
pub mod run;
pub mod stop;

use shard_runtime::Group;

pub(crate) fn print_group(group: &Group) {
    println!("Group: {} ({})", group.name, group.image);
    for shard in &group.shards {
        let short_id: String = shard.id.chars().take(8).collect();
        println!(
            "|- [{}] {} ({}) unit: {} weight: {}",
            shard.status,
            shard.name,
            short_id,
            shard.unit.encode(),
            shard.unit.weight(),
        );
    }
    println!();
}
